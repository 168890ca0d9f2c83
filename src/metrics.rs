use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "errors_ingested_total",
        "Accepted error reports by ingestion path (queue or direct)"
    );
    describe_counter!(
        "drain_records_total",
        "Records taken off the queue by the drain worker, by outcome"
    );
    describe_counter!(
        "drain_dequeue_failures_total",
        "Failed dequeue attempts in the drain worker"
    );
    describe_counter!(
        "cache_lookups_total",
        "Cache lookups by cache family and outcome"
    );
    describe_counter!("cache_writes_total", "Cache entries written");
    describe_counter!(
        "cache_invalidations_total",
        "Invalidate-all runs by outcome"
    );
    describe_counter!(
        "background_tasks_total",
        "Supervised background tasks by name and outcome"
    );
    describe_counter!(
        "auth_failures_total",
        "Requests rejected by the API key check"
    );
    describe_gauge!("error_logs_info", "Service version information");

    gauge!("error_logs_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a rejected API key
pub fn record_auth_failure(reason: &'static str) {
    counter!("auth_failures_total", "reason" => reason).increment(1);
}
