pub mod errors;
pub mod health;
pub mod metrics_handler;

use std::sync::Arc;

use crate::{backend::QueueBackend, service::ErrorService, store::ApiKeyStore};

/// Shared state for the API routes
#[derive(Clone)]
pub struct AppState {
    pub service: ErrorService,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub backend: Arc<dyn QueueBackend>,
    pub auth_enabled: bool,
}
