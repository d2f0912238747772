//! Shared fixtures: an in-memory app and request helpers

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use gatehouse_api::{create_test_router, AppState};
use gatehouse_auth::{AuthConfig, UserCreate};
use gatehouse_db::User;

pub const ACCESS_SECRET: &str = "access-secret-key-for-tests-min-32-bytes!";
pub const PASSWORD: &str = "correct-horse-battery";

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.jwt.access_secret = ACCESS_SECRET.into();
    config.jwt.refresh_secret = "refresh-secret-key-for-tests-min-32-bytes".into();
    config.reset.secret = "reset-secret-key-for-tests-min-32-bytes!!".into();
    config.verify.secret = "verify-secret-key-for-tests-min-32-bytes!".into();
    config.password.memory_cost = 4096;
    config.password.time_cost = 1;
    config
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let state = Arc::new(AppState::in_memory(config).unwrap());
        let router = create_test_router(state.clone());
        Self { state, router }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(json!(null));
        TestResponse { status, headers, json }
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        self.send(request.body(body).unwrap()).await
    }

    /// Form login against `path` from `ip`
    pub async fn login_at(&self, path: &str, username: &str, password: &str, ip: &str) -> TestResponse {
        let form = format!(
            "username={}&password={}",
            username.replace('@', "%40"),
            password
        );
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("X-Forwarded-For", ip)
            .body(Body::from(form))
            .unwrap();
        self.send(request).await
    }

    pub async fn access_token(&self, email: &str) -> String {
        let response = self.login_at("/auth/jwt/login", email, PASSWORD, "10.0.0.1").await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.json);
        response.json["access_token"].as_str().unwrap().to_string()
    }

    pub async fn refresh_token(&self, email: &str) -> String {
        let response = self
            .login_at("/auth/jwt/refresh-login", email, PASSWORD, "10.0.0.1")
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.json);
        response.json["refresh_token"].as_str().unwrap().to_string()
    }

    pub async fn user(&self, email: &str) -> User {
        self.create_user(email, false).await
    }

    pub async fn admin(&self, email: &str) -> User {
        self.create_user(email, true).await
    }

    async fn create_user(&self, email: &str, is_admin: bool) -> User {
        let mut create = UserCreate::new(email, PASSWORD);
        create.is_admin = Some(is_admin);
        create.is_verified = Some(true);
        self.state.auth.users.register(create, false).await.unwrap()
    }
}
