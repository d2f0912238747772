//! OAuth2 authorize/callback against a mock provider

mod common;

use std::collections::HashMap;

use axum::http::{Method, StatusCode};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use url::Url;

use common::{test_config, TestApp};
use gatehouse_auth::config::OAuthProviderConfig;

async fn provider(email: &str) -> ServerGuard {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("code".into(), "good-code".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "idp-token", "expires_in": 3600}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/userinfo")
        .match_header("authorization", "Bearer idp-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"sub": "idp-42", "email": email}).to_string())
        .create_async()
        .await;
    server
}

fn app(server: &ServerGuard, associate_by_email: bool) -> TestApp {
    let mut config = test_config();
    config.oauth.state_secret = "oauth-state-secret-for-tests-min-32-bytes".into();
    config.oauth.associate_by_email = associate_by_email;
    config.oauth.providers.push(OAuthProviderConfig {
        name: "acme".into(),
        client_id: "gatehouse".into(),
        client_secret: "shh".into(),
        authorize_endpoint: format!("{}/authorize", server.url()),
        access_token_endpoint: format!("{}/token", server.url()),
        userinfo_endpoint: format!("{}/userinfo", server.url()),
        scopes: vec!["email".into()],
        redirect_url: "http://localhost:8000/auth/acme/callback".into(),
        id_field: "sub".into(),
        email_field: "email".into(),
    });
    TestApp::with_config(config)
}

async fn signed_state(app: &TestApp) -> String {
    let response = app.json(Method::GET, "/auth/acme/authorize", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    let url = Url::parse(response.json["authorization_url"].as_str().unwrap()).unwrap();
    let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "gatehouse");
    params["state"].clone()
}

#[tokio::test]
async fn test_callback_creates_user_and_logs_in() {
    let server = provider("sam@example.com").await;
    let app = app(&server, false);
    let state = signed_state(&app).await;

    let uri = format!("/auth/acme/callback?code=good-code&state={}", state);
    let response = app.json(Method::GET, &uri, None, None).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.json);
    let token = response.json["access_token"].as_str().unwrap();

    let me = app.json(Method::GET, "/users/me", Some(token), None).await;
    assert_eq!(me.json["email"], "sam@example.com");

    // Second round trip resolves the same account
    let state = signed_state(&app).await;
    let uri = format!("/auth/acme/callback?code=good-code&state={}", state);
    let again = app.json(Method::GET, &uri, None, None).await;
    assert_eq!(again.status, StatusCode::OK);
}

#[tokio::test]
async fn test_forged_state_is_rejected() {
    let server = provider("sam@example.com").await;
    let app = app(&server, false);

    let response = app
        .json(Method::GET, "/auth/acme/callback?code=good-code&state=forged", None, None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["detail"], "OAUTH_INVALID_STATE");
}

#[tokio::test]
async fn test_existing_email_needs_association() {
    let server = provider("ann@example.com").await;

    let strict = app(&server, false);
    strict.user("ann@example.com").await;
    let state = signed_state(&strict).await;
    let uri = format!("/auth/acme/callback?code=good-code&state={}", state);
    let response = strict.json(Method::GET, &uri, None, None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["detail"], "OAUTH_USER_ALREADY_EXISTS");

    let linking = app(&server, true);
    let user = linking.user("ann@example.com").await;
    let state = signed_state(&linking).await;
    let uri = format!("/auth/acme/callback?code=good-code&state={}", state);
    let response = linking.json(Method::GET, &uri, None, None).await;
    assert_eq!(response.status, StatusCode::OK);

    let token = response.json["access_token"].as_str().unwrap();
    let me = linking.json(Method::GET, "/users/me", Some(token), None).await;
    assert_eq!(me.json["id"], user.id.to_string());
}

#[tokio::test]
async fn test_unknown_provider() {
    let server = provider("sam@example.com").await;
    let app = app(&server, false);
    let response = app.json(Method::GET, "/auth/nope/authorize", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json["detail"], "OAUTH_PROVIDER_NOT_FOUND");
}
