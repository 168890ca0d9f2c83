use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::AppState;
use crate::backend::QueueBackend;

/// Health check endpoint
/// Returns 200 OK if the service is running
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "service": "error-logs",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Readiness check endpoint
/// Returns 503 while the queue backend is unreachable
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.backend.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({
            "status": "ready",
            "service": "error-logs",
        }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
                "status": "degraded",
                "service": "error-logs",
                "reason": e.to_string(),
            })))
        }
    }
}
