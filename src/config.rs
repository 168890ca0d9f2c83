use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
    pub tasks: TasksConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./data/error_logs.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Backend holding the ingestion queue and the cache
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum QueueConfig {
    Redis {
        url: String,
        #[serde(default = "default_redis_pool_size")]
        pool_size: usize,
    },
    Memory,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::Memory
    }
}

fn default_redis_pool_size() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub list_ttl_seconds: u64,
    pub stats_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_ttl_seconds: 120,
            stats_ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_seconds)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub dequeue_timeout_seconds: u64,
    pub retry_delay_seconds: u64,
    pub recent_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout_seconds: 5,
            retry_delay_seconds: 1,
            recent_capacity: 100,
        }
    }
}

impl WorkerConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TasksConfig {
    pub max_concurrent: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self { max_concurrent: 64 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Load configuration from `path` (optional) and `ERROR_LOGS__*` environment variables
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("ERROR_LOGS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.database.url.is_empty() {
        anyhow::bail!("database.url cannot be empty");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be greater than 0");
    }

    if let QueueConfig::Redis { url, pool_size } = &cfg.queue {
        if url.is_empty() {
            anyhow::bail!("queue.url cannot be empty when queue.backend = \"redis\"");
        }
        if *pool_size == 0 {
            anyhow::bail!("queue.pool_size must be greater than 0");
        }
    }

    if cfg.cache.list_ttl_seconds == 0 || cfg.cache.stats_ttl_seconds == 0 {
        anyhow::bail!("Cache TTLs must be greater than 0");
    }

    if cfg.worker.dequeue_timeout_seconds == 0 {
        anyhow::bail!("worker.dequeue_timeout_seconds must be greater than 0");
    }

    if cfg.worker.recent_capacity == 0 {
        anyhow::bail!("worker.recent_capacity must be greater than 0");
    }

    if cfg.tasks.max_concurrent == 0 {
        anyhow::bail!("tasks.max_concurrent must be greater than 0");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Invalid server.log_format '{}': expected text or json", other),
    }

    Ok(())
}
