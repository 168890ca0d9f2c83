//! SQLite implementation of the error and API key stores
//!
//! Timestamps are stored as Unix milliseconds and the context object as a
//! JSON string.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{ApiKeyStore, ErrorStore, StoreError};
use crate::models::{self, ApiKey, Context, ErrorRecord, ListQuery, StatsResponse};

const ERROR_COLUMNS: &str = "id, timestamp, level, message, stack_trace, context, source, \
     environment, user_agent, ip_address, url, fingerprint, resolved, \
     count, first_seen, last_seen, created_at, updated_at";

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database and run migrations
    ///
    /// In-memory databases are pinned to a single long-lived connection,
    /// otherwise every pooled connection would see its own empty database.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations on it
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations completed");
        Ok(Self { pool })
    }
}

#[derive(sqlx::FromRow)]
struct ErrorRow {
    id: String,
    timestamp: i64,
    level: String,
    message: String,
    stack_trace: Option<String>,
    context: String,
    source: String,
    environment: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    url: Option<String>,
    fingerprint: String,
    resolved: bool,
    count: i64,
    first_seen: i64,
    last_seen: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ErrorRow> for ErrorRecord {
    type Error = StoreError;

    fn try_from(row: ErrorRow) -> Result<Self, Self::Error> {
        // A stored `null` reads back as an empty object
        let context = serde_json::from_str::<Option<Context>>(&row.context)
            .map_err(|e| StoreError::Decode(format!("invalid context for {}: {}", row.id, e)))?
            .unwrap_or_default();

        Ok(ErrorRecord {
            id: parse_uuid(&row.id)?,
            timestamp: from_millis(row.timestamp)?,
            level: row.level,
            message: row.message,
            stack_trace: row.stack_trace,
            context,
            source: row.source,
            environment: row.environment,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            url: row.url,
            fingerprint: row.fingerprint,
            resolved: row.resolved,
            count: row.count,
            first_seen: from_millis(row.first_seen)?,
            last_seen: from_millis(row.last_seen)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    key_hash: String,
    name: String,
    project_id: Option<String>,
    active: bool,
    created_at: i64,
    last_used: Option<i64>,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = StoreError;

    fn try_from(row: ApiKeyRow) -> Result<Self, Self::Error> {
        Ok(ApiKey {
            id: parse_uuid(&row.id)?,
            key_hash: row.key_hash,
            name: row.name,
            project_id: row.project_id.as_deref().map(parse_uuid).transpose()?,
            active: row.active,
            created_at: from_millis(row.created_at)?,
            last_used: row.last_used.map(from_millis).transpose()?,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Decode(format!("invalid id '{}': {}", value, e)))
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {}", millis)))
}

/// Start of the current UTC day
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[async_trait]
impl ErrorStore for SqliteStore {
    async fn create_error(&self, record: &ErrorRecord) -> Result<(), StoreError> {
        let context = serde_json::to_string(&record.context)?;

        sqlx::query(&format!(
            "INSERT INTO errors ({ERROR_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ))
        .bind(record.id.to_string())
        .bind(record.timestamp.timestamp_millis())
        .bind(&record.level)
        .bind(&record.message)
        .bind(&record.stack_trace)
        .bind(context)
        .bind(&record.source)
        .bind(&record.environment)
        .bind(&record.user_agent)
        .bind(&record.ip_address)
        .bind(&record.url)
        .bind(&record.fingerprint)
        .bind(record.resolved)
        .bind(record.count)
        .bind(record.first_seen.timestamp_millis())
        .bind(record.last_seen.timestamp_millis())
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_errors(&self, query: &ListQuery) -> Result<(Vec<ErrorRecord>, i64), StoreError> {
        const FILTER: &str = "(?1 IS NULL OR level = ?1) AND (?2 IS NULL OR source = ?2)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM errors WHERE {FILTER}"))
            .bind(&query.level)
            .bind(&query.source)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, ErrorRow>(&format!(
            "SELECT {ERROR_COLUMNS} FROM errors WHERE {FILTER}
             ORDER BY timestamp DESC LIMIT ?3 OFFSET ?4"
        ))
        .bind(&query.level)
        .bind(&query.source)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        let errors = rows
            .into_iter()
            .map(ErrorRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((errors, total))
    }

    async fn get_error_by_id(&self, id: Uuid) -> Result<ErrorRecord, StoreError> {
        let row = sqlx::query_as::<_, ErrorRow>(&format!(
            "SELECT {ERROR_COLUMNS} FROM errors WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        row.try_into()
    }

    async fn resolve_error(&self, id: Uuid) -> Result<(), StoreError> {
        // updated_at always moves forward, even within the same millisecond
        let result = sqlx::query(
            "UPDATE errors SET resolved = 1, updated_at = MAX(?1, updated_at + 1) WHERE id = ?2",
        )
        .bind(models::now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_error(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM errors WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<StatsResponse, StoreError> {
        let now = Utc::now();
        let today = start_of_day(now).timestamp_millis();
        let week = (now - ChronoDuration::days(7)).timestamp_millis();
        let month = (now - ChronoDuration::days(30)).timestamp_millis();

        let (total_errors, resolved_errors, errors_today, errors_this_week, errors_this_month) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN resolved = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN timestamp >= ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN timestamp >= ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN timestamp >= ?3 THEN 1 ELSE 0 END), 0)
                 FROM errors",
            )
            .bind(today)
            .bind(week)
            .bind(month)
            .fetch_one(&self.pool)
            .await?;

        Ok(StatsResponse {
            total_errors,
            resolved_errors,
            errors_today,
            errors_this_week,
            errors_this_month,
        })
    }
}

#[async_trait]
impl ApiKeyStore for SqliteStore {
    async fn validate_api_key(&self, key_hash: &str) -> Result<ApiKey, StoreError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT id, key_hash, name, project_id, active, created_at, last_used
             FROM api_keys WHERE key_hash = ?1 AND active = 1",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let api_key = ApiKey::try_from(row)?;

        if let Err(e) = sqlx::query("UPDATE api_keys SET last_used = ?1 WHERE id = ?2")
            .bind(models::now().timestamp_millis())
            .bind(api_key.id.to_string())
            .execute(&self.pool)
            .await
        {
            tracing::warn!(api_key = %api_key.name, error = %e, "Failed to update API key last_used");
        }

        Ok(api_key)
    }

    async fn create_api_key(
        &self,
        name: &str,
        key_hash: &str,
        project_id: Option<Uuid>,
    ) -> Result<ApiKey, StoreError> {
        let api_key = ApiKey {
            id: Uuid::new_v4(),
            key_hash: key_hash.to_string(),
            name: name.to_string(),
            project_id,
            active: true,
            created_at: models::now(),
            last_used: None,
        };

        sqlx::query(
            "INSERT INTO api_keys (id, key_hash, name, project_id, active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        )
        .bind(api_key.id.to_string())
        .bind(&api_key.key_hash)
        .bind(&api_key.name)
        .bind(api_key.project_id.map(|id| id.to_string()))
        .bind(api_key.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(api_key)
    }
}
