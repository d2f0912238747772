//! Role and access-right routes driven through `axum_test::TestServer`

mod common;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};
use uuid::Uuid;

use common::TestApp;

struct Rbac {
    app: TestApp,
    server: TestServer,
    admin: HeaderValue,
}

impl Rbac {
    async fn new() -> Self {
        let app = TestApp::new();
        app.admin("admin@example.com").await;
        let token = app.access_token("admin@example.com").await;
        let server = TestServer::new(app.router.clone()).unwrap();
        Self {
            app,
            server,
            admin: bearer(&token),
        }
    }

    async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.server
            .post(path)
            .add_header(header::AUTHORIZATION, self.admin.clone())
            .json(&body)
            .await
    }

    async fn get(&self, path: &str) -> TestResponse {
        self.server
            .get(path)
            .add_header(header::AUTHORIZATION, self.admin.clone())
            .await
    }

    async fn create(&self, collection: &str, name: &str) -> Uuid {
        let response = self.post(collection, json!({"name": name})).await;
        response.assert_status(StatusCode::CREATED);
        let id = response.json::<Value>()["id"].as_str().unwrap().to_string();
        id.parse().unwrap()
    }
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

#[tokio::test]
async fn test_non_admin_is_forbidden() {
    let rbac = Rbac::new().await;
    rbac.app.user("ann@example.com").await;
    let token = rbac.app.access_token("ann@example.com").await;

    let response = rbac
        .server
        .post("/roles")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"name": "editor"}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    response.assert_json(&json!({"detail": "FORBIDDEN"}));

    let anonymous = rbac.server.get("/rights").await;
    anonymous.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_crud() {
    let rbac = Rbac::new().await;
    let id = rbac.create("/roles", "editor").await;

    let duplicate = rbac.post("/roles", json!({"name": "editor"})).await;
    duplicate.assert_status(StatusCode::BAD_REQUEST);
    duplicate.assert_json(&json!({"detail": "ROLE_ALREADY_EXISTS"}));

    let renamed = rbac
        .server
        .put(&format!("/roles/{}", id))
        .add_header(header::AUTHORIZATION, rbac.admin.clone())
        .json(&json!({"name": "writer"}))
        .await;
    renamed.assert_status_ok();
    assert_eq!(renamed.json::<Value>()["name"], "writer");

    rbac.create("/roles", "reader").await;
    let page = rbac.get("/roles?name=WRI").await;
    page.assert_status_ok();
    let page = page.json::<Value>();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "writer");

    let deleted = rbac
        .server
        .delete(&format!("/roles/{}", id))
        .add_header(header::AUTHORIZATION, rbac.admin.clone())
        .await;
    deleted.assert_status(StatusCode::NO_CONTENT);

    let missing = rbac.get(&format!("/roles/{}", id)).await;
    missing.assert_status(StatusCode::NOT_FOUND);
    missing.assert_json(&json!({"detail": "ROLE_NOT_EXISTS"}));
}

#[tokio::test]
async fn test_rights_crud() {
    let rbac = Rbac::new().await;
    let id = rbac.create("/rights", "articles:read").await;

    let fetched = rbac.get(&format!("/rights/{}", id)).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>()["name"], "articles:read");

    let empty_name = rbac.post("/rights", json!({"name": ""})).await;
    empty_name.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let missing = rbac.get(&format!("/rights/{}", Uuid::new_v4())).await;
    missing.assert_status(StatusCode::NOT_FOUND);
    missing.assert_json(&json!({"detail": "ACCESS_RIGHT_NOT_EXISTS"}));
}

#[tokio::test]
async fn test_role_is_assigned_once() {
    let rbac = Rbac::new().await;
    let user = rbac.app.user("ann@example.com").await;
    let role_id = rbac.create("/roles", "editor").await;
    let body = json!({"user_id": user.id, "role_id": role_id});

    rbac.post("/users/roles", body.clone())
        .await
        .assert_status(StatusCode::CREATED);

    let again = rbac.post("/users/roles", body.clone()).await;
    again.assert_status(StatusCode::BAD_REQUEST);
    again.assert_json(&json!({"detail": "ROLE_ALREADY_ASSIGN"}));

    let removed = rbac
        .server
        .delete("/users/roles")
        .add_header(header::AUTHORIZATION, rbac.admin.clone())
        .json(&body)
        .await;
    removed.assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_user_without_roles_is_no_content() {
    let rbac = Rbac::new().await;
    let user = rbac.app.user("ann@example.com").await;
    let token = rbac.app.access_token("ann@example.com").await;

    let roles = rbac
        .server
        .get(&format!("/users/{}/roles", user.id))
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    roles.assert_status(StatusCode::NO_CONTENT);
    assert!(roles.text().is_empty());

    let rights = rbac.get(&format!("/users/{}/rights", user.id)).await;
    rights.assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_users_cannot_inspect_each_other() {
    let rbac = Rbac::new().await;
    let bob = rbac.app.user("bob@example.com").await;
    rbac.app.user("ann@example.com").await;
    let token = rbac.app.access_token("ann@example.com").await;

    let response = rbac
        .server
        .get(&format!("/users/{}/roles", bob.id))
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_user_rights_are_the_union_of_role_rights() {
    let rbac = Rbac::new().await;
    let user = rbac.app.user("ann@example.com").await;

    let editor = rbac.create("/roles", "editor").await;
    let reviewer = rbac.create("/roles", "reviewer").await;
    let read = rbac.create("/rights", "articles:read").await;
    let write = rbac.create("/rights", "articles:write").await;

    for (role_id, right_id) in [(editor, read), (editor, write), (reviewer, read)] {
        rbac.post(
            "/roles/rights",
            json!({"role_id": role_id, "access_right_id": right_id}),
        )
        .await
        .assert_status(StatusCode::CREATED);
    }
    let twice = rbac
        .post("/roles/rights", json!({"role_id": editor, "access_right_id": read}))
        .await;
    twice.assert_status(StatusCode::BAD_REQUEST);
    twice.assert_json(&json!({"detail": "ACCESS_RIGHT_ALREADY_ASSIGN"}));

    for role_id in [editor, reviewer] {
        rbac.post("/users/roles", json!({"user_id": user.id, "role_id": role_id}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let editor_rights = rbac.get(&format!("/roles/{}/rights", editor)).await;
    editor_rights.assert_status_ok();
    assert_eq!(editor_rights.json::<Vec<Value>>().len(), 2);

    let rights = rbac.get(&format!("/users/{}/rights", user.id)).await;
    rights.assert_status_ok();
    let mut names: Vec<String> = rights
        .json::<Vec<Value>>()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["articles:read", "articles:write"]);

    let roles = rbac.get(&format!("/users/{}/roles", user.id)).await;
    roles.assert_status_ok();
    assert_eq!(roles.json::<Vec<Value>>().len(), 2);
}
