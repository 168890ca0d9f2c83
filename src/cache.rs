//! Cache-aside storage for list pages and aggregate stats
//!
//! List pages are cached under a key derived from the filter tuple and
//! recorded in an index set, so that [`CacheLayer::invalidate_all`] can find
//! every one of them without scanning the keyspace.
//!
//! Reads never fail: a backend error or an undecodable entry is treated as
//! a miss and the caller goes to the store.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::backend::{BackendError, QueueBackend};
use crate::models::{ErrorRecord, ListQuery, StatsResponse};

pub const LIST_KEY_PREFIX: &str = "error_cache:list_";
pub const STATS_KEY: &str = "stats_cache";
pub const KEY_SET: &str = "cache_keys_set";

pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(120);
pub const DEFAULT_STATS_TTL: Duration = Duration::from_secs(300);

/// A cached list page together with the total it was served with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPage {
    pub errors: Vec<ErrorRecord>,
    pub total: i64,
}

/// Cache key for one filter tuple
pub fn list_key(query: &ListQuery) -> String {
    format!(
        "{}{}_{}_{}_{}",
        LIST_KEY_PREFIX,
        query.limit,
        query.offset,
        query.level.as_deref().unwrap_or(""),
        query.source.as_deref().unwrap_or("")
    )
}

#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn QueueBackend>,
    list_ttl: Duration,
    stats_ttl: Duration,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self::with_ttls(backend, DEFAULT_LIST_TTL, DEFAULT_STATS_TTL)
    }

    pub fn with_ttls(backend: Arc<dyn QueueBackend>, list_ttl: Duration, stats_ttl: Duration) -> Self {
        Self {
            backend,
            list_ttl,
            stats_ttl,
        }
    }

    pub async fn get_list(&self, query: &ListQuery) -> Option<CachedPage> {
        self.read("list", &list_key(query)).await
    }

    pub async fn put_list(&self, query: &ListQuery, page: &CachedPage) -> Result<(), BackendError> {
        self.write("list", &list_key(query), page, self.list_ttl, Some(KEY_SET))
            .await
    }

    pub async fn get_stats(&self) -> Option<StatsResponse> {
        self.read("stats", STATS_KEY).await
    }

    pub async fn put_stats(&self, stats: &StatsResponse) -> Result<(), BackendError> {
        self.write("stats", STATS_KEY, stats, self.stats_ttl, None).await
    }

    /// Drop every cached list page and the stats entry
    ///
    /// Safe to call repeatedly and concurrently; deleting an absent key is
    /// a no-op. Backend failures are logged and absorbed.
    pub async fn invalidate_all(&self) {
        if let Err(e) = self.try_invalidate_all().await {
            counter!("cache_invalidations_total", "outcome" => "error").increment(1);
            tracing::warn!(error = %e, "Cache invalidation failed");
        } else {
            counter!("cache_invalidations_total", "outcome" => "ok").increment(1);
        }
    }

    async fn try_invalidate_all(&self) -> Result<(), BackendError> {
        let keys = self.backend.set_members(KEY_SET).await?;
        if !keys.is_empty() {
            let deleted = self.backend.delete_indexed(&keys, KEY_SET).await?;
            tracing::debug!(keys = keys.len(), deleted, "Invalidated list cache");
        }
        self.backend.delete(&[STATS_KEY.to_string()]).await?;
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, cache: &'static str, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                counter!("cache_lookups_total", "cache" => cache, "outcome" => "miss").increment(1);
                tracing::debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                counter!("cache_lookups_total", "cache" => cache, "outcome" => "error").increment(1);
                tracing::warn!(key, error = %e, "Cache read failed, falling back to store");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                counter!("cache_lookups_total", "cache" => cache, "outcome" => "hit").increment(1);
                tracing::debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                counter!("cache_lookups_total", "cache" => cache, "outcome" => "error").increment(1);
                tracing::warn!(key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(
        &self,
        cache: &'static str,
        key: &str,
        value: &T,
        ttl: Duration,
        index: Option<&str>,
    ) -> Result<(), BackendError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| BackendError::Serialization(e.to_string()))?;
        self.backend.set_indexed(key, &bytes, ttl, index).await?;
        counter!("cache_writes_total", "cache" => cache).increment(1);
        tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cache populated");
        Ok(())
    }
}
