use crate::{
    error::AppError,
    handlers::AppState,
    metrics,
    store::{ApiKeyStore, StoreError},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const API_KEY_HEADER: &str = "X-API-Key";
const API_KEY_PREFIX: &str = "el_";
const API_KEY_RANDOM_LEN: usize = 32;

/// Authentication information attached to each authenticated request
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub api_key_id: Uuid,
    /// Name of the API key used for authentication
    pub api_key_name: String,
}

/// Authentication middleware
/// Validates the `X-API-Key` header against the active keys in the store
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.auth_enabled {
        return Ok(next.run(req).await);
    }

    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            metrics::record_auth_failure("missing");
            AppError::Unauthorized("API key required".to_string())
        })?;

    let key = match state.api_keys.validate_api_key(&hash_api_key(api_key)).await {
        Ok(key) => key,
        Err(StoreError::NotFound) => {
            metrics::record_auth_failure("invalid");
            return Err(AppError::Unauthorized("Invalid API key".to_string()));
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    req.extensions_mut().insert(AuthInfo {
        api_key_id: key.id,
        api_key_name: key.name,
    });

    Ok(next.run(req).await)
}

/// Hex SHA-256 of a raw API key, the form kept in the store
pub fn hash_api_key(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Fresh random API key; shown once, only its hash is stored
pub fn generate_api_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", API_KEY_PREFIX, random)
}
