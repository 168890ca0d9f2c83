use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Free-form key/value context attached to an error report
pub type Context = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_LEVEL: &str = "error";
pub const DEFAULT_SOURCE: &str = "unknown";
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// A single ingested error report
///
/// Field names are the wire format shared with existing clients and with
/// entries already sitting in the queue, so they must not be renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub stack_trace: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub context: Context,
    pub source: String,
    pub environment: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub url: Option<String>,
    pub fingerprint: String,
    pub resolved: bool,
    pub count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/errors`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CreateErrorRequest {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub context: Context,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CreateErrorRequest {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Paginated list response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorListResponse {
    pub errors: Vec<ErrorRecord>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Aggregate counts over all stored errors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_errors: i64,
    pub resolved_errors: i64,
    pub errors_today: i64,
    pub errors_this_week: i64,
    pub errors_this_month: i64,
}

/// Filter and page selection for list queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: i64,
    pub offset: i64,
    pub level: Option<String>,
    pub source: Option<String>,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset,
            level: None,
            source: None,
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into()).filter(|l: &String| !l.is_empty());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// 1-based page number for the current offset
    pub fn page(&self) -> i64 {
        if self.limit <= 0 {
            return 1;
        }
        self.offset / self.limit + 1
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

/// Stored API key; the raw key is never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub name: String,
    pub project_id: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Current time at the precision the store keeps (milliseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Context, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Context>::deserialize(deserializer)?.unwrap_or_default())
}
