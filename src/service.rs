//! Ingestion service: orchestrates queue, store, and cache
//!
//! Writes go through the queue and fall back to a direct store write when
//! the queue is unavailable. Reads are cache-aside. Every mutation drops
//! the whole cache.

use std::convert::Infallible;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::{CacheLayer, CachedPage};
use crate::fingerprint::fingerprint;
use crate::models::{
    self, CreateErrorRequest, ErrorListResponse, ErrorRecord, ListQuery, StatsResponse,
    DEFAULT_ENVIRONMENT, DEFAULT_LEVEL, DEFAULT_SOURCE,
};
use crate::queue::IngestionQueue;
use crate::store::{ErrorStore, StoreError};
use crate::tasks::TaskSupervisor;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("error not found")]
    NotFound,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct ErrorService {
    store: Arc<dyn ErrorStore>,
    queue: IngestionQueue,
    cache: CacheLayer,
    tasks: TaskSupervisor,
}

impl ErrorService {
    pub fn new(
        store: Arc<dyn ErrorStore>,
        queue: IngestionQueue,
        cache: CacheLayer,
        tasks: TaskSupervisor,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
            tasks,
        }
    }

    pub fn tasks(&self) -> &TaskSupervisor {
        &self.tasks
    }

    /// Accept a new error report
    ///
    /// The record is queued for the drain worker; if the queue is down it
    /// is written to the store directly, and a store failure on that path
    /// is returned to the caller.
    pub async fn create(
        &self,
        request: CreateErrorRequest,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<ErrorRecord, ServiceError> {
        let record = build_record(request, user_agent, ip_address)?;

        match self.queue.enqueue(&record).await {
            Ok(()) => {
                counter!("errors_ingested_total", "path" => "queue").increment(1);
            }
            Err(e) => {
                tracing::warn!(
                    error_id = %record.id,
                    error = %e,
                    "Queue unavailable, writing error directly to the store"
                );
                self.store.create_error(&record).await?;
                counter!("errors_ingested_total", "path" => "direct").increment(1);
            }
        }

        self.cache.invalidate_all().await;

        tracing::info!(
            error_id = %record.id,
            level = %record.level,
            source = %record.source,
            fingerprint = %record.fingerprint,
            "Error ingested"
        );
        Ok(record)
    }

    pub async fn get_errors(&self, query: ListQuery) -> Result<ErrorListResponse, ServiceError> {
        let page = query.page();
        let limit = query.limit;

        if let Some(cached) = self.cache.get_list(&query).await {
            return Ok(ErrorListResponse {
                errors: cached.errors,
                total: cached.total,
                page,
                limit,
            });
        }

        let (errors, total) = self.store.get_errors(&query).await?;

        if !errors.is_empty() {
            let cache = self.cache.clone();
            let cached = CachedPage {
                errors: errors.clone(),
                total,
            };
            self.tasks.spawn("populate_list_cache", async move {
                cache.put_list(&query, &cached).await
            });
        }

        Ok(ErrorListResponse {
            errors,
            total,
            page,
            limit,
        })
    }

    pub async fn get_error_by_id(&self, id: Uuid) -> Result<ErrorRecord, ServiceError> {
        Ok(self.store.get_error_by_id(id).await?)
    }

    pub async fn resolve(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.resolve_error(id).await?;
        tracing::info!(error_id = %id, "Error resolved");
        self.invalidate_in_background();
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.delete_error(id).await?;
        tracing::info!(error_id = %id, "Error deleted");
        self.invalidate_in_background();
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<StatsResponse, ServiceError> {
        if let Some(stats) = self.cache.get_stats().await {
            return Ok(stats);
        }

        let stats = self.store.get_stats().await?;

        let cache = self.cache.clone();
        let cached = stats.clone();
        self.tasks.spawn("populate_stats_cache", async move {
            cache.put_stats(&cached).await
        });

        Ok(stats)
    }

    /// Latest ingested records from the ring buffer, newest first
    ///
    /// Empty when the queue backend is unreachable.
    pub async fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        match self.queue.recent(limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read recent errors");
                Vec::new()
            }
        }
    }

    fn invalidate_in_background(&self) {
        let cache = self.cache.clone();
        self.tasks.spawn("invalidate_cache", async move {
            cache.invalidate_all().await;
            Ok::<_, Infallible>(())
        });
    }
}

fn build_record(
    request: CreateErrorRequest,
    user_agent: Option<String>,
    ip_address: Option<String>,
) -> Result<ErrorRecord, ServiceError> {
    if request.message.is_empty() {
        return Err(ServiceError::InvalidRequest("message is required".to_string()));
    }

    let now = models::now();
    let fingerprint = fingerprint(&request.message, request.stack_trace.as_deref());

    Ok(ErrorRecord {
        id: Uuid::new_v4(),
        timestamp: now,
        level: non_empty_or(request.level, DEFAULT_LEVEL),
        message: request.message,
        stack_trace: request.stack_trace,
        context: request.context,
        source: non_empty_or(request.source, DEFAULT_SOURCE),
        environment: non_empty_or(request.environment.unwrap_or_default(), DEFAULT_ENVIRONMENT),
        user_agent: user_agent.filter(|ua| !ua.is_empty()),
        ip_address: ip_address.filter(|ip| !ip.is_empty()),
        url: request.url,
        fingerprint,
        resolved: false,
        count: 1,
        first_seen: now,
        last_seen: now,
        created_at: now,
        updated_at: now,
    })
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
