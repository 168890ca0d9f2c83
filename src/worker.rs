//! Drain worker: the single consumer moving queued records into the store
//!
//! Delivery is at-most-once. A record whose persistence fails is logged and
//! dropped, never requeued. Dequeue failures are retried forever after a
//! fixed delay.
//!
//! On shutdown the worker finishes the dequeue in flight, then empties the
//! queue with non-blocking pops before returning, so records accepted by an
//! in-process backend are not lost with the process.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::cache::CacheLayer;
use crate::models::ErrorRecord;
use crate::queue::{IngestionQueue, QueueError};
use crate::signals::ShutdownSignal;
use crate::store::ErrorStore;
use crate::tasks::TaskSupervisor;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What happened to one dequeued record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Persisted(Uuid),
    Dropped(Uuid),
}

pub struct DrainWorker {
    queue: IngestionQueue,
    store: Arc<dyn ErrorStore>,
    cache: CacheLayer,
    tasks: TaskSupervisor,
    retry_delay: Duration,
}

impl DrainWorker {
    pub fn new(
        queue: IngestionQueue,
        store: Arc<dyn ErrorStore>,
        cache: CacheLayer,
        tasks: TaskSupervisor,
    ) -> Self {
        Self {
            queue,
            store,
            cache,
            tasks,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Consume the queue until a shutdown signal arrives, then drain what is left
    ///
    /// A dequeue already in flight when the signal arrives is allowed to
    /// complete; its wait is bounded by the queue's dequeue timeout.
    pub async fn run(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        tracing::info!("Drain worker started");

        loop {
            let dequeue = self.queue.dequeue();
            tokio::pin!(dequeue);

            let mut stopping = false;
            let raced = tokio::select! {
                result = &mut dequeue => Some(result),
                _ = shutdown.recv() => None,
            };
            let dequeued = match raced {
                Some(result) => result,
                None => {
                    stopping = true;
                    dequeue.await
                }
            };

            match dequeued {
                Ok(Some(record)) => {
                    self.persist(record).await;
                }
                Ok(None) => {}
                Err(e) => {
                    counter!("drain_dequeue_failures_total").increment(1);
                    tracing::error!(error = %e, "Failed to dequeue error, retrying");
                    if !stopping {
                        tokio::select! {
                            _ = shutdown.recv() => stopping = true,
                            _ = tokio::time::sleep(self.retry_delay) => {}
                        }
                    }
                }
            }

            if stopping {
                break;
            }
        }

        let drained = self.drain_remaining().await;
        tracing::info!(drained, "Drain worker stopped");
    }

    /// Persist everything still queued without waiting for new arrivals
    ///
    /// Stops at the first backend failure. Returns how many records were
    /// taken off the queue.
    pub async fn drain_remaining(&self) -> usize {
        let mut drained = 0;

        loop {
            match self.queue.try_dequeue().await {
                Ok(Some(record)) => {
                    self.persist(record).await;
                    drained += 1;
                }
                Ok(None) => break,
                Err(QueueError::Serialization(e)) => {
                    counter!("drain_records_total", "outcome" => "dropped").increment(1);
                    tracing::error!(error = %e, "Dropping undecodable queued error");
                    drained += 1;
                }
                Err(e) => {
                    counter!("drain_dequeue_failures_total").increment(1);
                    tracing::warn!(error = %e, drained, "Stopped draining queue at shutdown");
                    break;
                }
            }
        }

        drained
    }

    /// Dequeue and persist at most one record
    ///
    /// Returns `Ok(None)` when the queue stayed empty for the dequeue timeout.
    pub async fn process_next(&self) -> Result<Option<DrainOutcome>, QueueError> {
        match self.queue.dequeue().await? {
            Some(record) => Ok(Some(self.persist(record).await)),
            None => Ok(None),
        }
    }

    async fn persist(&self, record: ErrorRecord) -> DrainOutcome {
        let id = record.id;

        if let Err(e) = self.store.create_error(&record).await {
            counter!("drain_records_total", "outcome" => "dropped").increment(1);
            tracing::error!(error_id = %id, error = %e, "Failed to persist queued error, dropping it");
            return DrainOutcome::Dropped(id);
        }

        counter!("drain_records_total", "outcome" => "persisted").increment(1);
        tracing::debug!(error_id = %id, "Queued error persisted");

        let cache = self.cache.clone();
        self.tasks.spawn("invalidate_cache", async move {
            cache.invalidate_all().await;
            Ok::<_, Infallible>(())
        });

        DrainOutcome::Persisted(id)
    }
}
