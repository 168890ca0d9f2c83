//! Stable short identifiers for grouping recurring errors

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 16;

/// Derive the fingerprint of an error from its message and optional stack trace.
///
/// SHA-256 over `message + stack_trace`, hex encoded and truncated to
/// [`FINGERPRINT_LEN`] characters.
pub fn fingerprint(message: &str, stack_trace: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    if let Some(stack_trace) = stack_trace {
        hasher.update(stack_trace.as_bytes());
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}
