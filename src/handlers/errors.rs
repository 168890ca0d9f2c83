//! Error ingestion and query endpoints

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Extension, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use uuid::Uuid;

use super::AppState;
use crate::{
    auth::AuthInfo,
    error::AppError,
    models::{CreateErrorRequest, ListQuery},
};

/// Raw list parameters; unparsable or out-of-range values fall back to defaults
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub level: Option<String>,
    pub source: Option<String>,
}

impl ListParams {
    pub fn into_query(self) -> ListQuery {
        let limit = self
            .limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| (1..=ListQuery::MAX_LIMIT).contains(l))
            .unwrap_or(ListQuery::DEFAULT_LIMIT);
        let offset = self
            .offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .unwrap_or(0);

        ListQuery::new(limit, offset)
            .with_level(self.level.unwrap_or_default())
            .with_source(self.source.unwrap_or_default())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    pub limit: Option<String>,
}

/// POST /api/errors
pub async fn create_error(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    auth: Option<Extension<AuthInfo>>,
    headers: HeaderMap,
    payload: Result<Json<CreateErrorRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e.body_text())))?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip_address = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let record = state
        .service
        .create(request, user_agent, ip_address)
        .await?;

    match auth {
        Some(Extension(auth)) => tracing::info!(
            error_id = %record.id,
            level = %record.level,
            api_key = %auth.api_key_name,
            api_key_id = %auth.api_key_id,
            "Error accepted"
        ),
        None => tracing::info!(error_id = %record.id, level = %record.level, "Error accepted"),
    }

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/errors
pub async fn list_errors(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.service.get_errors(params.into_query()).await?;
    Ok(Json(response))
}

/// GET /api/errors/recent
pub async fn recent_errors(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(ListQuery::DEFAULT_LIMIT as usize)
        .min(ListQuery::MAX_LIMIT as usize);

    Json(state.service.recent_errors(limit).await)
}

/// GET /api/errors/{id}
pub async fn get_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let record = state.service.get_error_by_id(id).await?;
    Ok(Json(record))
}

/// PUT /api/errors/{id}/resolve
pub async fn resolve_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    state.service.resolve(id).await?;
    Ok(Json(json!({ "status": "resolved" })))
}

/// DELETE /api/errors/{id}
pub async fn delete_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stats = state.service.get_stats().await?;
    Ok(Json(stats))
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid error ID".to_string()))
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header_value("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return Some(first.to_string());
        }
    }

    if let Some(real_ip) = header_value("x-real-ip") {
        return Some(real_ip.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn params(limit: Option<&str>, offset: Option<&str>) -> ListParams {
        ListParams {
            limit: limit.map(str::to_string),
            offset: offset.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_list_params_defaults_and_bounds() {
        assert_eq!(params(None, None).into_query(), ListQuery::new(50, 0));
        assert_eq!(params(Some("25"), Some("75")).into_query(), ListQuery::new(25, 75));
        assert_eq!(params(Some("0"), Some("-1")).into_query(), ListQuery::new(50, 0));
        assert_eq!(params(Some("101"), Some("abc")).into_query(), ListQuery::new(50, 0));
        assert_eq!(params(Some("100"), None).into_query(), ListQuery::new(100, 0));
    }

    #[test]
    fn test_list_params_empty_filters_are_ignored() {
        let query = ListParams {
            level: Some(String::new()),
            source: Some("web".to_string()),
            ..Default::default()
        }
        .into_query();

        assert!(query.level.is_none());
        assert_eq!(query.source.as_deref(), Some("web"));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        let peer: SocketAddr = "192.0.2.10:443".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("198.51.100.2"));
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)).as_deref(), Some("192.0.2.10"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(matches!(parse_id("not-a-uuid"), Err(AppError::BadRequest(_))));
        assert!(parse_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
