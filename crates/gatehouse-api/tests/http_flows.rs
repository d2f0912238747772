//! End-to-end authentication flows through the router

mod common;

use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use serde_json::{json, Value};

use common::{test_config, TestApp, ACCESS_SECRET, PASSWORD};
use gatehouse_auth::config::RouteLimit;
use gatehouse_auth::{audience, TokenCodec, ACCESS_RIGHT_IDS};

// =============================================================================
// Login
// =============================================================================

mod login {
    use super::*;

    #[tokio::test]
    async fn test_login_by_email_or_username() {
        let app = TestApp::new();
        app.user("ann@example.com").await;

        let response = app
            .login_at("/auth/jwt/login", "ann@example.com", PASSWORD, "10.0.0.1")
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json["token_type"], "bearer");
        assert!(response.json["access_token"].is_string());
        assert!(response.json.get("refresh_token").is_none());

        // Username defaults to the e-mail
        let token = response.json["access_token"].as_str().unwrap();
        let me = app.json(Method::GET, "/users/me", Some(token), None).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.json["email"], "ann@example.com");
        assert!(me.json.get("hashed_password").is_none());
    }

    #[tokio::test]
    async fn test_bad_password_and_unknown_user_look_alike() {
        let app = TestApp::new();
        app.user("ann@example.com").await;

        let wrong = app
            .login_at("/auth/jwt/login", "ann@example.com", "wrong-password", "10.0.0.1")
            .await;
        let unknown = app
            .login_at("/auth/jwt/login", "nobody@example.com", PASSWORD, "10.0.0.1")
            .await;

        assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
        assert_eq!(wrong.json, json!({"detail": "LOGIN_BAD_CREDENTIALS"}));
        assert_eq!(unknown.status, wrong.status);
        assert_eq!(unknown.json, wrong.json);
    }

    #[tokio::test]
    async fn test_unverified_login_when_verification_required() {
        let mut config = test_config();
        config.require_verified_login = true;
        let app = TestApp::with_config(config);

        let register = app
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": "new@example.com", "password": PASSWORD})),
            )
            .await;
        assert_eq!(register.status, StatusCode::CREATED);

        let response = app
            .login_at("/auth/jwt/login", "new@example.com", PASSWORD, "10.0.0.1")
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json["detail"], "LOGIN_USER_NOT_VERIFIED");
    }

    #[tokio::test]
    async fn test_login_is_rate_limited_per_ip() {
        let mut config = test_config();
        config.rate_limit.login = RouteLimit {
            limit: 2,
            window: Duration::from_secs(10),
        };
        let app = TestApp::with_config(config);
        app.user("ann@example.com").await;

        for _ in 0..2 {
            let response = app
                .login_at("/auth/jwt/login", "ann@example.com", "wrong-password", "10.0.0.7")
                .await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
        }

        let limited = app
            .login_at("/auth/jwt/login", "ann@example.com", PASSWORD, "10.0.0.7")
            .await;
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.json["detail"], "TOO_MANY_REQUESTS");
        let retry_after: u64 = limited.headers[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=10).contains(&retry_after));

        // Another client is unaffected
        let other = app
            .login_at("/auth/jwt/login", "ann@example.com", PASSWORD, "10.0.0.8")
            .await;
        assert_eq!(other.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_records_history() {
        let app = TestApp::new();
        app.user("ann@example.com").await;
        let token = app.access_token("ann@example.com").await;
        app.access_token("ann@example.com").await;

        let history = app
            .json(Method::GET, "/users/me/history?page=1&limit=10", Some(&token), None)
            .await;
        assert_eq!(history.status, StatusCode::OK);
        assert_eq!(history.json["total"], 2);
        assert_eq!(history.json["items"].as_array().unwrap().len(), 2);
    }
}

// =============================================================================
// Registration & account flows
// =============================================================================

mod register {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_email_in_any_case() {
        let app = TestApp::new();
        let first = app
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": "ann@example.com", "password": PASSWORD})),
            )
            .await;
        assert_eq!(first.status, StatusCode::CREATED);
        assert_eq!(first.json["is_superuser"], false);

        let second = app
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": "Ann@Example.COM", "password": PASSWORD})),
            )
            .await;
        assert_eq!(second.status, StatusCode::BAD_REQUEST);
        assert_eq!(second.json, json!({"detail": "REGISTER_USER_ALREADY_EXISTS"}));
    }

    #[tokio::test]
    async fn test_weak_password_carries_reason() {
        let app = TestApp::new();
        let response = app
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": "ann@example.com", "password": "short"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json["detail"]["code"], "REGISTER_INVALID_PASSWORD");
        assert_eq!(
            response.json["detail"]["reason"],
            "Password should be at least 8 characters"
        );
    }

    #[tokio::test]
    async fn test_privileged_fields_are_ignored_on_register() {
        let app = TestApp::new();
        let response = app
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": "sneaky@example.com",
                    "password": PASSWORD,
                    "is_superuser": true,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.json["is_superuser"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_unprocessable() {
        let app = TestApp::new();
        let missing = app
            .json(Method::POST, "/auth/register", None, Some(json!({"email": "a@b.co"})))
            .await;
        assert_eq!(missing.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(missing.json["detail"]["code"], "VALIDATION_ERROR");

        let bad_email = app
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": "not-an-email", "password": PASSWORD})),
            )
            .await;
        assert_eq!(bad_email.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_forgot_password_never_reveals_accounts() {
        let app = TestApp::new();
        app.user("ann@example.com").await;

        for email in ["ann@example.com", "ghost@example.com"] {
            let response = app
                .json(
                    Method::POST,
                    "/auth/forgot-password",
                    None,
                    Some(json!({"email": email})),
                )
                .await;
            assert_eq!(response.status, StatusCode::ACCEPTED);
        }
    }

    #[tokio::test]
    async fn test_request_verify_token_for_verified_user_is_accepted() {
        let app = TestApp::new();
        app.user("ann@example.com").await;
        let response = app
            .json(
                Method::POST,
                "/auth/request-verify-token",
                None,
                Some(json!({"email": "ann@example.com"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_reset_and_verify_reject_garbage_tokens() {
        let app = TestApp::new();
        let reset = app
            .json(
                Method::POST,
                "/auth/reset-password",
                None,
                Some(json!({"token": "garbage", "password": PASSWORD})),
            )
            .await;
        assert_eq!(reset.status, StatusCode::BAD_REQUEST);
        assert_eq!(reset.json["detail"], "RESET_PASSWORD_BAD_TOKEN");

        let verify = app
            .json(Method::POST, "/auth/verify", None, Some(json!({"token": "garbage"})))
            .await;
        assert_eq!(verify.status, StatusCode::BAD_REQUEST);
        assert_eq!(verify.json["detail"], "VERIFY_USER_BAD_TOKEN");
    }

    #[tokio::test]
    async fn test_update_me_ignores_privileged_fields() {
        let app = TestApp::new();
        app.user("ann@example.com").await;
        let token = app.access_token("ann@example.com").await;

        let response = app
            .json(
                Method::PATCH,
                "/users/me",
                Some(&token),
                Some(json!({"first_name": "Ann", "is_superuser": true})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json["first_name"], "Ann");
        assert_eq!(response.json["is_superuser"], false);
    }
}

// =============================================================================
// Token lifecycle
// =============================================================================

mod tokens {
    use super::*;

    fn right_ids(token: &str) -> Vec<Value> {
        let claims = TokenCodec::hs256(ACCESS_SECRET)
            .verify(token, audience::ACCESS)
            .unwrap();
        claims[ACCESS_RIGHT_IDS].as_array().unwrap().clone()
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_rights() {
        let app = TestApp::new();
        let user = app.user("ann@example.com").await;
        let access = app.access_token("ann@example.com").await;
        assert!(right_ids(&access).is_empty());
        let refresh = app.refresh_token("ann@example.com").await;

        let auth = &app.state.auth;
        let role = auth.roles.create("editor").await.unwrap();
        let right = auth.rights.create("articles:write").await.unwrap();
        auth.rights.assign_role_access_right(role.id, right.id).await.unwrap();
        auth.roles.assign_user_role(user.id, role.id).await.unwrap();

        let response = app
            .json(Method::POST, "/auth/jwt/refresh", Some(&refresh), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
        let fresh = response.json["access_token"].as_str().unwrap();
        assert_eq!(right_ids(fresh), vec![Value::String(right.id.to_string())]);
    }

    #[tokio::test]
    async fn test_access_and_refresh_tokens_are_not_interchangeable() {
        let app = TestApp::new();
        app.user("ann@example.com").await;
        let access = app.access_token("ann@example.com").await;
        let refresh = app.refresh_token("ann@example.com").await;

        let me = app.json(Method::GET, "/users/me", Some(&refresh), None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);

        let response = app
            .json(Method::POST, "/auth/jwt/refresh", Some(&access), None)
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["detail"], "REFRESH_BAD_TOKEN");
    }

    #[tokio::test]
    async fn test_logout_revokes_access_token() {
        let app = TestApp::new();
        app.user("ann@example.com").await;
        let token = app.access_token("ann@example.com").await;

        let first = app.json(Method::POST, "/auth/jwt/logout", Some(&token), None).await;
        assert_eq!(first.status, StatusCode::NO_CONTENT);

        let second = app.json(Method::POST, "/auth/jwt/logout", Some(&token), None).await;
        assert_eq!(second.status, StatusCode::UNAUTHORIZED);

        let me = app.json(Method::GET, "/users/me", Some(&token), None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_blacklisted_refresh_token_cannot_refresh() {
        let app = TestApp::new();
        app.user("ann@example.com").await;
        let refresh = app.refresh_token("ann@example.com").await;

        let revoked = app
            .json(Method::POST, "/auth/jwt/blacklist", Some(&refresh), None)
            .await;
        assert_eq!(revoked.status, StatusCode::NO_CONTENT);

        let response = app
            .json(Method::POST, "/auth/jwt/refresh", Some(&refresh), None)
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["detail"], "REFRESH_BAD_TOKEN");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = TestApp::new();
        let response = app.json(Method::POST, "/auth/jwt/logout", None, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json, json!({"detail": "UNAUTHORIZED"}));
    }

    #[tokio::test]
    async fn test_cookie_login_sets_and_clears_cookie() {
        let mut config = test_config();
        config.cookie.enabled = true;
        let app = TestApp::with_config(config);
        app.user("ann@example.com").await;

        let login = app
            .login_at("/auth/cookie/login", "ann@example.com", PASSWORD, "10.0.0.1")
            .await;
        assert_eq!(login.status, StatusCode::NO_CONTENT);
        let set_cookie = login.headers[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        let pair = set_cookie.split(';').next().unwrap().to_string();

        let me = app
            .send(
                axum::http::Request::get("/users/me")
                    .header(header::COOKIE, &pair)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(me.status, StatusCode::OK);

        let logout = app
            .send(
                axum::http::Request::post("/auth/cookie/logout")
                    .header(header::COOKIE, &pair)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(logout.status, StatusCode::NO_CONTENT);
        assert!(logout.headers[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
    }
}

// =============================================================================
// Superuser administration
// =============================================================================

mod superuser {
    use super::*;
    use gatehouse_auth::UserCreate;

    #[tokio::test]
    async fn test_user_admin_routes_need_superuser() {
        let app = TestApp::new();
        let target = app.user("bob@example.com").await;
        app.admin("admin@example.com").await;
        let admin_token = app.access_token("admin@example.com").await;

        let uri = format!("/users/{}", target.id);
        let response = app.json(Method::GET, &uri, Some(&admin_token), None).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);

        let mut create = UserCreate::new("root@example.com", PASSWORD);
        create.is_superuser = Some(true);
        app.state.auth.users.register(create, false).await.unwrap();
        let root_token = app.access_token("root@example.com").await;

        let patched = app
            .json(
                Method::PATCH,
                &uri,
                Some(&root_token),
                Some(json!({"is_active": false})),
            )
            .await;
        assert_eq!(patched.status, StatusCode::OK);
        assert_eq!(patched.json["is_active"], false);

        let deleted = app.json(Method::DELETE, &uri, Some(&root_token), None).await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        let gone = app.json(Method::GET, &uri, Some(&root_token), None).await;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
        assert_eq!(gone.json["detail"], "USER_NOT_EXISTS");
    }

    #[tokio::test]
    async fn test_malformed_id_is_unprocessable() {
        let app = TestApp::new();
        let mut create = UserCreate::new("root@example.com", PASSWORD);
        create.is_superuser = Some(true);
        app.state.auth.users.register(create, false).await.unwrap();
        let token = app.access_token("root@example.com").await;

        let response = app.json(Method::GET, "/users/not-a-uuid", Some(&token), None).await;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json["detail"]["code"], "INVALID_ID");
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app.json(Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["status"], "healthy");
}
