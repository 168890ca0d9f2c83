use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{BackendError, ListTrim, QueueBackend};

#[derive(Debug)]
enum Entry {
    Value {
        data: Vec<u8>,
        expires_at: Instant,
    },
    List(VecDeque<Vec<u8>>),
    Set(HashSet<String>),
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Entry::Value { expires_at, .. } if *expires_at <= now)
    }
}

/// In-process backend with Redis list/set/TTL semantics
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<Mutex<HashMap<String, Entry>>>,
    pushed: Arc<Notify>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently in a list (0 when absent)
    pub async fn list_len(&self, key: &str) -> usize {
        match self.data.lock().await.get(key) {
            Some(Entry::List(list)) => list.len(),
            _ => 0,
        }
    }

    async fn pop_tail(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut data = self.data.lock().await;
        let popped = match data.get_mut(key) {
            Some(Entry::List(list)) => list.pop_back(),
            Some(_) => return Err(wrong_type(key)),
            None => None,
        };
        if matches!(data.get(key), Some(Entry::List(list)) if list.is_empty()) {
            data.remove(key);
        }
        Ok(popped)
    }
}

fn wrong_type(key: &str) -> BackendError {
    BackendError::Command(format!("WRONGTYPE operation against key '{}'", key))
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn push_lists(
        &self,
        keys: &[&str],
        value: &[u8],
        trim: Option<ListTrim<'_>>,
    ) -> Result<(), BackendError> {
        let mut data = self.data.lock().await;

        // Validate first so a type error leaves every list untouched
        for key in keys.iter().copied().chain(trim.map(|t| t.key)) {
            if let Some(entry) = data.get(key) {
                if !matches!(entry, Entry::List(_)) {
                    return Err(wrong_type(key));
                }
            }
        }

        for key in keys {
            if let Entry::List(list) = data
                .entry(key.to_string())
                .or_insert_with(|| Entry::List(VecDeque::new()))
            {
                list.push_front(value.to_vec());
            }
        }

        if let Some(trim) = trim {
            if let Some(Entry::List(list)) = data.get_mut(trim.key) {
                list.truncate(trim.max_len);
            }
        }

        drop(data);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a push in between is not missed
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.pop_tail(key).await? {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.pop_tail(key).await
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        let data = self.data.lock().await;
        match data.get(key) {
            Some(Entry::List(list)) => Ok(list
                .iter()
                .skip(start)
                .take(stop.saturating_sub(start) + 1)
                .cloned()
                .collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        if data.get(key).is_some_and(|e| e.is_expired(now)) {
            data.remove(key);
            return Ok(None);
        }
        match data.get(key) {
            Some(Entry::Value { data, .. }) => Ok(Some(data.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        index: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut data = self.data.lock().await;

        if let Some(index) = index {
            if matches!(data.get(index), Some(e) if !matches!(e, Entry::Set(_))) {
                return Err(wrong_type(index));
            }
        }

        data.insert(
            key.to_string(),
            Entry::Value {
                data: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );

        if let Some(index) = index {
            if let Entry::Set(set) = data
                .entry(index.to_string())
                .or_insert_with(|| Entry::Set(HashSet::new()))
            {
                set.insert(key.to_string());
            }
        }

        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError> {
        let data = self.data.lock().await;
        match data.get(key) {
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = data.remove(key) {
                if !entry.is_expired(now) {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn delete_indexed(&self, keys: &[String], index: &str) -> Result<u64, BackendError> {
        let mut data = self.data.lock().await;
        if matches!(data.get(index), Some(e) if !matches!(e, Entry::Set(_))) {
            return Err(wrong_type(index));
        }

        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = data.remove(key) {
                if !entry.is_expired(now) {
                    deleted += 1;
                }
            }
        }

        let now_empty = match data.get_mut(index) {
            Some(Entry::Set(set)) => {
                for key in keys {
                    set.remove(key);
                }
                set.is_empty()
            }
            _ => false,
        };
        if now_empty {
            data.remove(index);
        }

        Ok(deleted)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
