//! API-key authentication: SHA-256 hash comparison against stored keys.
//!
//! The system runs open until the first key exists; from then on every
//! non-health endpoint requires a valid key.

use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use rand::distr::{Alphanumeric, SampleString};
use sha2::{Digest, Sha256};

use freightwire_common::{ApiKey, ApiRole};

use crate::error::ApiError;
use crate::ratelimit;
use crate::AppState;

/// Authenticated caller context, inserted into request extensions by the
/// middleware. `key` is None in open-access mode.
#[derive(Clone)]
pub struct AuthContext {
    pub key: Option<ApiKey>,
}

impl AuthContext {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        match &self.key {
            // Open mode: no keys configured yet, everything is admin.
            None => Ok(()),
            Some(key) if key.role == ApiRole::Admin => Ok(()),
            Some(_) => Err(ApiError::forbidden("admin key required")),
        }
    }
}

pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Generate a fresh cleartext API key. Shown once at creation.
pub fn generate_api_key() -> String {
    let token = Alphanumeric.sample_string(&mut rand::rng(), 40);
    format!("fw_{token}")
}

/// Rate limiting + API-key verification. `/health` and the push upgrade
/// endpoint are exempt from both (the push handler authenticates itself so
/// it can close with a proper code).
pub async fn middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path();
    if path == "/health" || path.starts_with("/ws") {
        return Ok(next.run(req).await);
    }

    let api_key = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let client = ratelimit::client_id(
        api_key.as_deref(),
        forwarded.as_deref(),
        &addr.ip().to_string(),
    );
    if !state.rate_limiter.check(&client) {
        return Err(ApiError::from(freightwire_common::FreightwireError::RateLimited));
    }

    let context = verify_key(&state, api_key.as_deref()).await?;
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

/// Verify an API key against the store. Returns the auth context, or an
/// error when keys exist and the presented key is missing or invalid.
pub async fn verify_key(state: &AppState, api_key: Option<&str>) -> Result<AuthContext, ApiError> {
    if !state.store.any_api_keys().await? {
        return Ok(AuthContext { key: None });
    }

    let Some(api_key) = api_key.filter(|k| !k.is_empty()) else {
        return Err(ApiError::unauthorized("API key required"));
    };

    let key_hash = hash_api_key(api_key);
    match state.store.find_api_key_by_hash(&key_hash).await? {
        Some(key) => {
            state.store.touch_api_key(key.id).await.ok();
            Ok(AuthContext { key: Some(key) })
        }
        None => Err(ApiError::unauthorized("invalid API key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        // echo -n 'fw_test' | sha256sum
        assert_eq!(hash_api_key("fw_test").len(), 64);
        assert_eq!(hash_api_key("a"), hash_api_key("a"));
        assert_ne!(hash_api_key("a"), hash_api_key("b"));
    }

    #[test]
    fn generated_keys_are_prefixed_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with("fw_"));
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }
}
