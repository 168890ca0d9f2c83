//! Durable ingestion queue
//!
//! Every enqueue pushes the serialized record onto two lists in one
//! atomic backend operation: the FIFO `error_queue` drained by the worker,
//! and the capped `recent_errors` ring buffer used for the live tail.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{BackendError, ListTrim, QueueBackend};
use crate::models::ErrorRecord;

pub const QUEUE_KEY: &str = "error_queue";
pub const RECENT_KEY: &str = "recent_errors";
pub const DEFAULT_RECENT_CAPACITY: usize = 100;
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("queue payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct IngestionQueue {
    backend: Arc<dyn QueueBackend>,
    dequeue_timeout: Duration,
    recent_capacity: usize,
}

impl IngestionQueue {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self::with_settings(backend, DEFAULT_DEQUEUE_TIMEOUT, DEFAULT_RECENT_CAPACITY)
    }

    pub fn with_settings(
        backend: Arc<dyn QueueBackend>,
        dequeue_timeout: Duration,
        recent_capacity: usize,
    ) -> Self {
        Self {
            backend,
            dequeue_timeout,
            recent_capacity,
        }
    }

    /// Push a record onto the work queue and the recent buffer
    pub async fn enqueue(&self, record: &ErrorRecord) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(record)?;
        let trim = ListTrim {
            key: RECENT_KEY,
            max_len: self.recent_capacity,
        };

        self.backend
            .push_lists(&[QUEUE_KEY, RECENT_KEY], &payload, Some(trim))
            .await?;

        tracing::debug!(error_id = %record.id, "Error enqueued");
        Ok(())
    }

    /// Take the oldest record, waiting up to the configured timeout
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    pub async fn dequeue(&self) -> Result<Option<ErrorRecord>, QueueError> {
        let Some(payload) = self
            .backend
            .blocking_pop(QUEUE_KEY, self.dequeue_timeout)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_slice(&payload)?))
    }

    /// Take the oldest record if one is queued, without waiting
    pub async fn try_dequeue(&self) -> Result<Option<ErrorRecord>, QueueError> {
        let Some(payload) = self.backend.pop(QUEUE_KEY).await? else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_slice(&payload)?))
    }

    /// Most recent records, newest first
    ///
    /// Entries that no longer deserialize are skipped.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ErrorRecord>, QueueError> {
        let limit = limit.min(self.recent_capacity);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let payloads = self.backend.list_range(RECENT_KEY, 0, limit - 1).await?;
        let records = payloads
            .iter()
            .filter_map(|payload| match serde_json::from_slice(payload) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable recent entry");
                    None
                }
            })
            .collect();

        Ok(records)
    }
}
