//! Gatehouse HTTP API
//!
//! Axum router over [`gatehouse_auth::AuthService`]. Every error leaves as
//! `{"detail": "<CODE>"}` or `{"detail": {"code", "reason"}}`.
//!
//! # Layers
//!
//! ```text
//! CORS ─► compression ─► trace (http_request span) ─► request id ─► routes
//! ```

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

const REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enable_cors: bool,
    /// `*` allows any origin
    pub cors_origins: Vec<String>,
    pub enable_compression: bool,
    pub enable_tracing: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            enable_compression: true,
            enable_tracing: true,
            max_body_size: 1024 * 1024,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(
            origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID)])
}

/// Full router with middleware
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let x_request_id = HeaderName::from_static(REQUEST_ID);

    let mut router = create_test_router(state)
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(from_fn(middleware::timing))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()));

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            },
        ));
    }

    // Outside the trace layer so the span sees the generated id
    router = router.layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    if config.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if config.enable_cors {
        router = router.layer(cors_layer(&config.cors_origins));
    }
    router
}

/// Routes and state only
pub fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api_routes(&state))
        .route("/health", get(handlers::health::health_check))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gatehouse_auth::AuthConfig;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let mut config = AuthConfig::default();
        config.jwt.access_secret = "access-secret-key-for-tests-min-32-bytes!".into();
        config.jwt.refresh_secret = "refresh-secret-key-for-tests-min-32-bytes".into();
        config.reset.secret = "reset-secret-key-for-tests-min-32-bytes!!".into();
        config.verify.secret = "verify-secret-key-for-tests-min-32-bytes!".into();
        Arc::new(AppState::in_memory(config).unwrap())
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.enable_cors);
        assert!(config.enable_compression);
        assert_eq!(config.cors_origins, vec!["*"]);
    }

    #[tokio::test]
    async fn test_health_carries_request_id() {
        let app = create_router(state(), ApiConfig::default());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = create_test_router(state());
        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
