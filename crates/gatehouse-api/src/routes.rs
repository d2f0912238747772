//! Route table
//!
//! ```text
//! /auth/jwt/{login,refresh-login,refresh,logout,blacklist}
//! /auth/cookie/{login,logout}            (cookie backend enabled)
//! /auth/{register,forgot-password,reset-password,request-verify-token,verify}
//! /auth/:provider/{authorize,callback}   (OAuth providers configured)
//! /users/me, /users/me/history, /users/:id
//! /users/roles, /users/:id/roles, /users/:id/rights
//! /roles, /roles/:id, /roles/:id/rights, /roles/rights
//! /rights, /rights/:id
//! ```

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use gatehouse_auth::{AuthService, RateLimiter};

use crate::handlers::{auth, oauth, rights, roles, users};
use crate::middleware::rate_limit;
use crate::state::AppState;

/// Apply `limiter` to every route already on `router`
fn limited(router: Router<Arc<AppState>>, limiter: Option<&RateLimiter>) -> Router<Arc<AppState>> {
    match limiter {
        Some(limiter) => router.route_layer(from_fn_with_state(limiter.clone(), rate_limit)),
        None => router,
    }
}

/// Every API route; which optional groups exist depends on `state`'s config
pub fn api_routes(state: &AppState) -> Router<Arc<AppState>> {
    let service = state.auth.as_ref();
    Router::new()
        .nest("/auth", auth_routes(service))
        .nest("/users", user_routes(service))
        .nest("/roles", role_routes(service))
        .nest("/rights", right_routes(service))
}

fn auth_routes(service: &AuthService) -> Router<Arc<AppState>> {
    let mut login = Router::new()
        .route("/jwt/login", post(auth::login))
        .route("/jwt/refresh-login", post(auth::refresh_login));
    if service.cookie.is_some() {
        login = login.route("/cookie/login", post(auth::cookie_login));
    }
    let login = limited(login, service.login_limiter.as_ref());

    let refresh = limited(
        Router::new().route("/jwt/refresh", post(auth::refresh)),
        service.refresh_limiter.as_ref(),
    );

    let mut router = Router::new()
        .route("/jwt/logout", post(auth::logout))
        .route("/jwt/blacklist", post(auth::blacklist))
        .route("/register", post(auth::register))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/request-verify-token", post(auth::request_verify_token))
        .route("/verify", post(auth::verify))
        .merge(login)
        .merge(refresh);
    if service.cookie.is_some() {
        router = router.route("/cookie/logout", post(auth::cookie_logout));
    }
    if !service.oauth.is_empty() {
        router = router
            .route("/:provider/authorize", get(oauth::authorize))
            .route("/:provider/callback", get(oauth::callback));
    }
    router
}

fn user_routes(service: &AuthService) -> Router<Arc<AppState>> {
    let rbac = Router::new()
        .route("/roles", post(users::assign_role).delete(users::remove_role))
        .route("/:id/roles", get(users::user_roles))
        .route("/:id/rights", get(users::user_rights));

    Router::new()
        .route("/me", get(users::me).patch(users::update_me))
        .route("/me/history", get(users::my_history))
        .route(
            "/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .merge(limited(rbac, service.rbac_limiter.as_ref()))
}

fn role_routes(service: &AuthService) -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/", get(roles::list_roles).post(roles::create_role))
        .route("/rights", post(roles::assign_right).delete(roles::remove_right))
        .route(
            "/:id",
            get(roles::get_role)
                .put(roles::update_role)
                .delete(roles::delete_role),
        )
        .route("/:id/rights", get(roles::role_rights));
    limited(router, service.rbac_limiter.as_ref())
}

fn right_routes(service: &AuthService) -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/", get(rights::list_rights).post(rights::create_right))
        .route(
            "/:id",
            get(rights::get_right)
                .put(rights::update_right)
                .delete(rights::delete_right),
        );
    limited(router, service.rbac_limiter.as_ref())
}
