//! Command implementations for the CLI
//!
//! - start: Start the server
//! - check: Validate configuration and connectivity
//! - keys: API key management

pub mod check;
pub mod keys;
pub mod start;
