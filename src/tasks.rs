//! Supervised background tasks
//!
//! Cache population and invalidation run detached from the request that
//! triggered them. They go through a [`TaskSupervisor`] so that concurrency
//! stays bounded, failures and panics are logged in one place, and shutdown
//! can wait for outstanding work.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use tokio::sync::{Notify, Semaphore};

pub const DEFAULT_MAX_CONCURRENT: usize = 64;

#[derive(Clone)]
pub struct TaskSupervisor {
    semaphore: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl TaskSupervisor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Number of tasks spawned but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Run `task` in the background under the concurrency limit
    ///
    /// The caller does not wait and never sees the outcome; errors and
    /// panics are logged and counted under `name`.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);

        let semaphore = self.semaphore.clone();
        let pending = self.pending.clone();
        let idle = self.idle.clone();

        tokio::spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(Ok(())) => "ok",
                    Ok(Err(e)) => {
                        tracing::warn!(task = name, error = %e, "Background task failed");
                        "error"
                    }
                    Err(panic) => {
                        tracing::error!(task = name, panic = ?panic, "Background task panicked");
                        "panic"
                    }
                },
                Err(_) => {
                    tracing::warn!(task = name, "Task supervisor closed, task skipped");
                    "skipped"
                }
            };

            counter!("background_tasks_total", "task" => name, "outcome" => outcome).increment(1);

            if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                idle.notify_waiters();
            }
        });
    }

    /// Wait until every spawned task has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for outstanding tasks, giving up after `timeout`
    ///
    /// Returns false when tasks were still running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, self.wait_idle()).await.is_ok();
        if drained {
            tracing::info!("Background tasks drained");
        } else {
            tracing::warn!(pending = self.pending(), "Background tasks still running at shutdown");
        }
        drained
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}
