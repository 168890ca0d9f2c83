pub mod auth;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod server;
pub mod service;
pub mod signals;
pub mod store;
pub mod tasks;
pub mod worker;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over `level` when set. `format` is `"json"` for
/// structured output, anything else gives human-readable lines.
///
/// Note: This function can only be called once.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
