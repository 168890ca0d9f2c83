//! Redis adapter for the queue/cache backend.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis;
use deadpool_redis::{Config, Connection, Pool, Runtime};

use super::{BackendError, ListTrim, QueueBackend};

/// Redis backend over a deadpool connection pool.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn new(url: &str, pool_size: usize) -> Result<Self, BackendError> {
        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| BackendError::Connection(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let backend = Self { pool };
        backend.ping().await?;
        Ok(backend)
    }

    async fn conn(&self) -> Result<Connection, BackendError> {
        self.pool
            .get()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))
    }
}

fn command_error(e: redis::RedisError) -> BackendError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
        BackendError::Connection(e.to_string())
    } else {
        BackendError::Command(e.to_string())
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn push_lists(
        &self,
        keys: &[&str],
        value: &[u8],
        trim: Option<ListTrim<'_>>,
    ) -> Result<(), BackendError> {
        let mut conn = self.conn().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.cmd("LPUSH").arg(*key).arg(value).ignore();
        }
        if let Some(trim) = trim {
            let stop = trim.max_len as isize - 1;
            pipe.cmd("LTRIM").arg(trim.key).arg(0).arg(stop).ignore();
        }

        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn blocking_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn().await?;

        let popped: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut *conn)
            .await
            .map_err(command_error)?;

        Ok(popped.map(|(_, value)| value))
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn().await?;

        redis::cmd("RPOP")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        let mut conn = self.conn().await?;

        redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.conn().await?;

        redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        index: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut conn = self.conn().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .ignore();
        if let Some(index) = index {
            pipe.cmd("SADD").arg(index).arg(key).ignore();
        }

        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError> {
        let mut conn = self.conn().await?;

        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;

        redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn delete_indexed(&self, keys: &[String], index: &str) -> Result<u64, BackendError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("DEL").arg(keys);
        pipe.cmd("SREM").arg(index).arg(keys).ignore();

        let (deleted,): (u64,) = pipe.query_async(&mut *conn).await.map_err(command_error)?;
        Ok(deleted)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.conn().await?;

        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map(|_| ())
            .map_err(|e| BackendError::Connection(e.to_string()))
    }
}
