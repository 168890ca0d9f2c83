//! Durable storage for error records and API keys
//!
//! The store is the single source of truth. Everything else (queue, cache)
//! holds transient copies that are rebuilt from here.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ApiKey, ErrorRecord, ListQuery, StatsResponse};

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ErrorStore: Send + Sync {
    async fn create_error(&self, record: &ErrorRecord) -> Result<(), StoreError>;

    /// One page of records, newest first, plus the total matching the filter
    async fn get_errors(&self, query: &ListQuery) -> Result<(Vec<ErrorRecord>, i64), StoreError>;

    async fn get_error_by_id(&self, id: Uuid) -> Result<ErrorRecord, StoreError>;

    /// Mark a record resolved; `NotFound` when no record has this id
    async fn resolve_error(&self, id: Uuid) -> Result<(), StoreError>;

    /// Delete a record; deleting an absent id succeeds
    async fn delete_error(&self, id: Uuid) -> Result<(), StoreError>;

    async fn get_stats(&self) -> Result<StatsResponse, StoreError>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Look up an active key by hash and refresh its `last_used`
    async fn validate_api_key(&self, key_hash: &str) -> Result<ApiKey, StoreError>;

    async fn create_api_key(
        &self,
        name: &str,
        key_hash: &str,
        project_id: Option<Uuid>,
    ) -> Result<ApiKey, StoreError>;
}
