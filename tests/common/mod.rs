//! Shared fakes and fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use error_logs::{
    backend::{BackendError, ListTrim, MemoryBackend, QueueBackend},
    cache::CacheLayer,
    models::{ErrorRecord, ListQuery, StatsResponse},
    queue::IngestionQueue,
    service::ErrorService,
    store::{ErrorStore, SqliteStore, StoreError},
    tasks::TaskSupervisor,
    worker::DrainWorker,
};

pub const TEST_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(50);

pub async fn memory_store() -> SqliteStore {
    SqliteStore::new("sqlite::memory:", 1).await.unwrap()
}

/// Service and worker wired the way the server wires them, with short timeouts
pub fn pipeline(
    store: Arc<dyn ErrorStore>,
    backend: Arc<dyn QueueBackend>,
) -> (ErrorService, DrainWorker) {
    let tasks = TaskSupervisor::new(8);
    let queue = IngestionQueue::with_settings(backend.clone(), TEST_DEQUEUE_TIMEOUT, 100);
    let cache = CacheLayer::new(backend);
    let worker = DrainWorker::new(queue.clone(), store.clone(), cache.clone(), tasks.clone())
        .with_retry_delay(Duration::from_millis(10));
    let service = ErrorService::new(store, queue, cache, tasks);
    (service, worker)
}

/// Store wrapper counting read calls, to tell cache hits from misses
pub struct CountingStore {
    inner: SqliteStore,
    pub list_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
}

impl CountingStore {
    pub async fn new() -> Self {
        Self {
            inner: memory_store().await,
            list_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ErrorStore for CountingStore {
    async fn create_error(&self, record: &ErrorRecord) -> Result<(), StoreError> {
        self.inner.create_error(record).await
    }

    async fn get_errors(&self, query: &ListQuery) -> Result<(Vec<ErrorRecord>, i64), StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_errors(query).await
    }

    async fn get_error_by_id(&self, id: Uuid) -> Result<ErrorRecord, StoreError> {
        self.inner.get_error_by_id(id).await
    }

    async fn resolve_error(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.resolve_error(id).await
    }

    async fn delete_error(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_error(id).await
    }

    async fn get_stats(&self) -> Result<StatsResponse, StoreError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_stats().await
    }
}

/// Store that refuses to persist records whose message is listed as poison
pub struct PoisonStore {
    inner: SqliteStore,
    poison: Mutex<HashSet<String>>,
    pub create_attempts: AtomicUsize,
}

impl PoisonStore {
    pub async fn new(poison: &[&str]) -> Self {
        Self {
            inner: memory_store().await,
            poison: Mutex::new(poison.iter().map(|m| m.to_string()).collect()),
            create_attempts: AtomicUsize::new(0),
        }
    }

    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ErrorStore for PoisonStore {
    async fn create_error(&self, record: &ErrorRecord) -> Result<(), StoreError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if self.poison.lock().unwrap().contains(&record.message) {
            return Err(StoreError::Decode("simulated write failure".to_string()));
        }
        self.inner.create_error(record).await
    }

    async fn get_errors(&self, query: &ListQuery) -> Result<(Vec<ErrorRecord>, i64), StoreError> {
        self.inner.get_errors(query).await
    }

    async fn get_error_by_id(&self, id: Uuid) -> Result<ErrorRecord, StoreError> {
        self.inner.get_error_by_id(id).await
    }

    async fn resolve_error(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.resolve_error(id).await
    }

    async fn delete_error(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_error(id).await
    }

    async fn get_stats(&self) -> Result<StatsResponse, StoreError> {
        self.inner.get_stats().await
    }
}

/// Backend that is unreachable for every operation
pub struct DownBackend;

fn down() -> BackendError {
    BackendError::Connection("connection refused".to_string())
}

#[async_trait]
impl QueueBackend for DownBackend {
    async fn push_lists(
        &self,
        _keys: &[&str],
        _value: &[u8],
        _trim: Option<ListTrim<'_>>,
    ) -> Result<(), BackendError> {
        Err(down())
    }

    async fn blocking_pop(
        &self,
        _key: &str,
        _timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        Err(down())
    }

    async fn pop(&self, _key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Err(down())
    }

    async fn list_range(
        &self,
        _key: &str,
        _start: usize,
        _stop: usize,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        Err(down())
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Err(down())
    }

    async fn set_indexed(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
        _index: Option<&str>,
    ) -> Result<(), BackendError> {
        Err(down())
    }

    async fn set_members(&self, _key: &str) -> Result<Vec<String>, BackendError> {
        Err(down())
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, BackendError> {
        Err(down())
    }

    async fn delete_indexed(&self, _keys: &[String], _index: &str) -> Result<u64, BackendError> {
        Err(down())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Err(down())
    }
}

/// In-memory backend whose first `failures` pops fail
pub struct FlakyPopBackend {
    inner: MemoryBackend,
    failures_left: AtomicUsize,
    pub failed_pops: AtomicUsize,
}

impl FlakyPopBackend {
    pub fn new(inner: MemoryBackend, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            failed_pops: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl QueueBackend for FlakyPopBackend {
    async fn push_lists(
        &self,
        keys: &[&str],
        value: &[u8],
        trim: Option<ListTrim<'_>>,
    ) -> Result<(), BackendError> {
        self.inner.push_lists(keys, value, trim).await
    }

    async fn blocking_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            self.failed_pops.fetch_add(1, Ordering::SeqCst);
            return Err(down());
        }
        self.inner.blocking_pop(key, timeout).await
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.pop(key).await
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        self.inner.list_range(key, start, stop).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.get(key).await
    }

    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        index: Option<&str>,
    ) -> Result<(), BackendError> {
        self.inner.set_indexed(key, value, ttl, index).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError> {
        self.inner.set_members(key).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError> {
        self.inner.delete(keys).await
    }

    async fn delete_indexed(&self, keys: &[String], index: &str) -> Result<u64, BackendError> {
        self.inner.delete_indexed(keys, index).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.inner.ping().await
    }
}

/// In-memory backend that runs queued cache writes right before the next
/// indexed delete, landing them between an invalidation's enumerate and
/// delete steps
pub struct InterleavingBackend {
    inner: MemoryBackend,
    pending_writes: Mutex<Vec<(String, Vec<u8>, Option<String>)>>,
}

impl InterleavingBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    /// Queue a write of `value` under `key`, indexed in `index` when given
    pub fn write_before_next_delete(&self, key: &str, value: &[u8], index: Option<&str>) {
        self.pending_writes.lock().unwrap().push((
            key.to_string(),
            value.to_vec(),
            index.map(str::to_string),
        ));
    }
}

#[async_trait]
impl QueueBackend for InterleavingBackend {
    async fn push_lists(
        &self,
        keys: &[&str],
        value: &[u8],
        trim: Option<ListTrim<'_>>,
    ) -> Result<(), BackendError> {
        self.inner.push_lists(keys, value, trim).await
    }

    async fn blocking_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.blocking_pop(key, timeout).await
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.pop(key).await
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        self.inner.list_range(key, start, stop).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.get(key).await
    }

    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        index: Option<&str>,
    ) -> Result<(), BackendError> {
        self.inner.set_indexed(key, value, ttl, index).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError> {
        self.inner.set_members(key).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError> {
        self.inner.delete(keys).await
    }

    async fn delete_indexed(&self, keys: &[String], index: &str) -> Result<u64, BackendError> {
        let writes: Vec<_> = self.pending_writes.lock().unwrap().drain(..).collect();
        for (key, value, write_index) in writes {
            self.inner
                .set_indexed(&key, &value, Duration::from_secs(120), write_index.as_deref())
                .await?;
        }
        self.inner.delete_indexed(keys, index).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.inner.ping().await
    }
}
