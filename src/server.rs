use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    auth,
    backend::{MemoryBackend, QueueBackend, RedisBackend},
    cache::CacheLayer,
    config::{Config, QueueConfig},
    handlers::{self, AppState},
    metrics,
    queue::IngestionQueue,
    service::ErrorService,
    signals::{setup_signal_handlers, shutdown_channel},
    store::{ErrorStore, SqliteStore},
    tasks::TaskSupervisor,
    worker::DrainWorker,
};

/// How long shutdown waits for background cache tasks
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the error log server
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the store and connects the queue backend
/// 3. Spawns the drain worker
/// 4. Serves requests until SIGTERM/SIGINT
/// 5. Stops the worker and drains background tasks
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    ensure_database_dir(&config.database.url)?;
    let store = Arc::new(
        SqliteStore::new(&config.database.url, config.database.max_connections)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.url))?,
    );
    info!(url = %config.database.url, "Database ready");

    let backend = connect_backend(&config.queue).await?;

    let (service, worker) = build_pipeline(&config, store.clone(), backend.clone());
    let tasks = service.tasks().clone();

    let shutdown_tx = shutdown_channel();
    let signal_handle = setup_signal_handlers(shutdown_tx.clone());
    let mut shutdown_rx = shutdown_tx.subscribe();

    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    let state = AppState {
        service,
        api_keys: store,
        backend,
        auth_enabled: config.auth.enabled,
    };
    let app = create_router(state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting error log server on {}", addr);
    if !config.auth.enabled {
        tracing::warn!("API key authentication is disabled");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Drain worker task failed");
    }
    tasks.shutdown(TASK_DRAIN_TIMEOUT).await;
    signal_handle.abort();

    info!("Server stopped gracefully");
    Ok(())
}

/// Connect the configured queue/cache backend
pub async fn connect_backend(config: &QueueConfig) -> Result<Arc<dyn QueueBackend>> {
    match config {
        QueueConfig::Redis { url, pool_size } => {
            let backend = RedisBackend::new(url, *pool_size)
                .await
                .context("Failed to connect to Redis")?;
            info!(pool_size, "Connected to Redis queue backend");
            Ok(Arc::new(backend))
        }
        QueueConfig::Memory => {
            tracing::warn!(
                "Using in-memory queue backend: queued errors survive a graceful shutdown but not a crash"
            );
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}

/// Wire the ingestion service and its drain worker around shared handles
pub fn build_pipeline(
    config: &Config,
    store: Arc<dyn ErrorStore>,
    backend: Arc<dyn QueueBackend>,
) -> (ErrorService, DrainWorker) {
    let tasks = TaskSupervisor::new(config.tasks.max_concurrent);
    let queue = IngestionQueue::with_settings(
        backend.clone(),
        config.worker.dequeue_timeout(),
        config.worker.recent_capacity,
    );
    let cache = CacheLayer::with_ttls(backend, config.cache.list_ttl(), config.cache.stats_ttl());

    let worker = DrainWorker::new(queue.clone(), store.clone(), cache.clone(), tasks.clone())
        .with_retry_delay(config.worker.retry_delay());
    let service = ErrorService::new(store, queue, cache, tasks);

    (service, worker)
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    // Only ingestion requires an API key
    let ingest = post(handlers::errors::create_error).route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::auth_middleware,
    ));

    let api_routes = Router::new()
        .route("/api/errors", get(handlers::errors::list_errors).merge(ingest))
        .route("/api/errors/recent", get(handlers::errors::recent_errors))
        .route(
            "/api/errors/:id",
            get(handlers::errors::get_error).delete(handlers::errors::delete_error),
        )
        .route("/api/errors/:id/resolve", put(handlers::errors::resolve_error))
        .route("/api/stats", get(handlers::errors::get_stats))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        // Public endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Create the parent directory of a file-backed SQLite URL
pub fn ensure_database_dir(url: &str) -> Result<()> {
    if url.contains(":memory:") {
        return Ok(());
    }

    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}
