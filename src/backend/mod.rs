//! Key-value/list backend shared by the ingestion queue and the cache
//!
//! The same backend serves two roles:
//! - **Queue**: list push/pop for the durable FIFO and the `recent` ring buffer
//! - **Cache**: TTL'd values plus an index set of cache keys
//!
//! Redis is the production backend; the in-memory backend keeps a single
//! process self-contained and stands in for Redis in tests.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Trim applied to a list in the same atomic step as a push
#[derive(Debug, Clone, Copy)]
pub struct ListTrim<'a> {
    pub key: &'a str,
    pub max_len: usize,
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Push `value` onto the head of every list in `keys`, then apply `trim`.
    /// All steps succeed or fail together.
    async fn push_lists(
        &self,
        keys: &[&str],
        value: &[u8],
        trim: Option<ListTrim<'_>>,
    ) -> Result<(), BackendError>;

    /// Pop from the tail of `key`, waiting up to `timeout` for an entry.
    /// Returns `Ok(None)` when the wait elapses.
    async fn blocking_pop(&self, key: &str, timeout: Duration)
        -> Result<Option<Vec<u8>>, BackendError>;

    /// Pop from the tail of `key` without waiting
    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Entries `start..=stop` of a list, head first
    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<Vec<u8>>, BackendError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Store `value` under `key` with a TTL and record `key` in the set `index`
    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        index: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError>;

    /// Delete every key in `keys`, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError>;

    /// Delete `keys` and drop them from the set `index` in one atomic step.
    /// A concurrent [`set_indexed`](Self::set_indexed) lands either wholly
    /// before (and is deleted) or wholly after (and stays indexed).
    async fn delete_indexed(&self, keys: &[String], index: &str) -> Result<u64, BackendError>;

    /// Connectivity check used by readiness probes
    async fn ping(&self) -> Result<(), BackendError>;
}
