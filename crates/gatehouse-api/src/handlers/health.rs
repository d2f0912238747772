//! Health check

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use gatehouse_db::{CacheBackend, CredentialStore};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`
    pub status: &'static str,
    pub version: &'static str,
    pub store: bool,
    pub cache: bool,
}

/// `GET /health`: 200 when the store and cache answer, 503 otherwise
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.store.ping().await.is_ok();
    let cache = state.cache.ping().await.is_ok();
    let healthy = store && cache;
    if !healthy {
        tracing::warn!(store, cache, "Health check failed");
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        store,
        cache,
    };
    (status, Json(body))
}
