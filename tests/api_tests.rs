/// HTTP surface tests driven through the router with `oneshot`
mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{memory_store, pipeline};
use error_logs::{
    auth::hash_api_key,
    backend::MemoryBackend,
    handlers::AppState,
    server::create_router,
    store::ApiKeyStore,
};

const API_KEY: &str = "el_test_key";

async fn test_app(auth_enabled: bool) -> Router {
    let store = Arc::new(memory_store().await);
    store
        .create_api_key("tests", &hash_api_key(API_KEY), None)
        .await
        .unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let (service, _worker) = pipeline(store.clone(), backend.clone());

    let state = AppState {
        service,
        api_keys: store,
        backend,
        auth_enabled,
    };
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();

    create_router(state, Arc::new(recorder.handle()))
}

fn post_error(body: Value, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/errors")
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app(true).await;

    let response = app.oneshot(request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_create_requires_api_key() {
    let app = test_app(true).await;

    let missing = app
        .clone()
        .oneshot(post_error(json!({"message": "boom"}), None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(missing).await["error"]["type"], "unauthorized");

    let wrong = app
        .oneshot(post_error(json!({"message": "boom"}), Some("el_wrong")))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_with_key_returns_created_record() {
    let app = test_app(true).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/errors")
        .header("content-type", "application/json")
        .header("X-API-Key", API_KEY)
        .header("User-Agent", "sdk/1.0")
        .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
        .body(Body::from(json!({"message": "NPE", "level": "error"}).to_string()))
        .unwrap();

    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["message"], "NPE");
    assert_eq!(body["source"], "unknown");
    assert_eq!(body["environment"], "production");
    assert_eq!(body["resolved"], false);
    assert_eq!(body["count"], 1);
    assert_eq!(body["user_agent"], "sdk/1.0");
    assert_eq!(body["ip_address"], "203.0.113.7");
    assert_eq!(body["context"], json!({}));
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 16);

    let recent = app
        .oneshot(request("GET", "/api/errors/recent?limit=5"))
        .await
        .unwrap();
    assert_eq!(recent.status(), StatusCode::OK);
    let recent = json_body(recent).await;
    assert_eq!(recent[0]["id"], body["id"]);
}

#[tokio::test]
async fn test_create_rejects_bad_payloads() {
    let app = test_app(true).await;

    let bad_json = Request::builder()
        .method("POST")
        .uri("/api/errors")
        .header("content-type", "application/json")
        .header("X-API-Key", API_KEY)
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(bad_json).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let no_message = app
        .oneshot(post_error(json!({"level": "error"}), Some(API_KEY)))
        .await
        .unwrap();
    assert_eq!(no_message.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(no_message).await["error"]["type"], "bad_request");
}

#[tokio::test]
async fn test_auth_can_be_disabled() {
    let app = test_app(false).await;

    let response = app
        .oneshot(post_error(json!({"message": "open ingest"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_get_error_by_id_status_codes() {
    let app = test_app(true).await;

    let malformed = app
        .clone()
        .oneshot(request("GET", "/api/errors/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .oneshot(request("GET", &format!("/api/errors/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_resolve_and_delete_status_codes() {
    let app = test_app(true).await;

    let resolve_missing = app
        .clone()
        .oneshot(request("PUT", &format!("/api/errors/{}/resolve", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(resolve_missing.status(), StatusCode::NOT_FOUND);

    let delete = app
        .oneshot(request("DELETE", &format!("/api/errors/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_list_and_stats_shapes() {
    let app = test_app(true).await;

    let list = app
        .clone()
        .oneshot(request("GET", "/api/errors?limit=500&offset=-3&level=error"))
        .await
        .unwrap();
    assert_eq!(list.status(), StatusCode::OK);
    let list = json_body(list).await;
    assert_eq!(list["limit"], 50);
    assert_eq!(list["page"], 1);
    assert_eq!(list["total"], 0);
    assert_eq!(list["errors"], json!([]));

    let stats = app.oneshot(request("GET", "/api/stats")).await.unwrap();
    assert_eq!(stats.status(), StatusCode::OK);
    let stats = json_body(stats).await;
    for field in [
        "total_errors",
        "resolved_errors",
        "errors_today",
        "errors_this_week",
        "errors_this_month",
    ] {
        assert_eq!(stats[field], 0, "{}", field);
    }
}

#[tokio::test]
async fn test_readiness_reports_backend() {
    let app = test_app(true).await;

    let response = app.oneshot(request("GET", "/ready")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
