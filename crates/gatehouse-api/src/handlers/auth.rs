//! Authentication handlers
//!
//! Token issue and revocation for the JWT bearer and cookie backends, plus
//! the registration, password reset and e-mail verification flows.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use tracing::info;

use gatehouse_auth::{AuthError, AuthenticationBackend, Requirements};

use crate::dto::{
    EmailRequest, LoginForm, RegisterRequest, ResetPasswordRequest, UserRead, VerifyRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ClientInfo, ValidForm, ValidJson};
use crate::state::AppState;

/// Check the form credentials, then issue through `backend` with fresh
/// access right claims
async fn password_login(
    state: &AppState,
    backend: &AuthenticationBackend,
    client: &ClientInfo,
    form: &LoginForm,
) -> ApiResult<Response> {
    let users = &state.auth.users;
    let user = users.login_user(&form.username, &form.password).await?;
    let claims = state.auth.access_claims(user.id).await?;
    let response = backend.login(&user, Some(claims)).await?;
    users.on_after_login(&user, &client.fingerprint()).await;

    info!(user_id = %user.id, backend = %backend.name, ip = %client.ip, "User logged in");
    Ok(response)
}

/// `POST /auth/jwt/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ValidForm(form): ValidForm<LoginForm>,
) -> ApiResult<Response> {
    password_login(&state, &state.auth.access, &client, &form).await
}

/// `POST /auth/jwt/refresh-login`: same credentials, refresh token out
pub async fn refresh_login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ValidForm(form): ValidForm<LoginForm>,
) -> ApiResult<Response> {
    password_login(&state, &state.auth.refresh, &client, &form).await
}

/// `POST /auth/jwt/refresh`: trade a refresh token for an access token
pub async fn refresh(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    let auth = &state.auth;
    let (user, _) = auth
        .authenticator
        .authenticate_with(&auth.refresh, &headers, Requirements::active().optional())
        .await?
        .ok_or(AuthError::RefreshBadToken)?;

    let claims = auth.access_claims(user.id).await?;
    Ok(auth.access.login(&user, Some(claims)).await?)
}

async fn revoke(
    state: &AppState,
    backend: &AuthenticationBackend,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let (user, token) = state
        .auth
        .authenticator
        .authenticate_with(backend, headers, Requirements::active())
        .await?
        .ok_or(AuthError::Unauthorized)?;

    let response = backend.logout(&user, &token).await?;
    info!(user_id = %user.id, backend = %backend.name, "Token revoked");
    Ok(response)
}

/// `POST /auth/jwt/logout`: revoke the access token
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    revoke(&state, &state.auth.access, &headers).await
}

/// `POST /auth/jwt/blacklist`: revoke the refresh token
pub async fn blacklist(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    revoke(&state, &state.auth.refresh, &headers).await
}

fn cookie_backend(state: &AppState) -> ApiResult<&AuthenticationBackend> {
    state
        .auth
        .cookie
        .as_deref()
        .ok_or_else(|| ApiError::Auth(AuthError::Internal("cookie backend is disabled".into())))
}

/// `POST /auth/cookie/login`
pub async fn cookie_login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ValidForm(form): ValidForm<LoginForm>,
) -> ApiResult<Response> {
    password_login(&state, cookie_backend(&state)?, &client, &form).await
}

/// `POST /auth/cookie/logout`
pub async fn cookie_logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    revoke(&state, cookie_backend(&state)?, &headers).await
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserRead>)> {
    let user = state.auth.users.register(request.into(), true).await?;
    info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// `POST /auth/forgot-password`
///
/// Always 202 so the endpoint cannot be used to enumerate accounts.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<EmailRequest>,
) -> ApiResult<StatusCode> {
    match state.auth.users.forgot_password(&request.email).await {
        Ok(()) | Err(AuthError::UserNotExists) | Err(AuthError::UserInactive) => {
            Ok(StatusCode::ACCEPTED)
        }
        Err(e) => Err(e.into()),
    }
}

/// `POST /auth/reset-password`
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .auth
        .users
        .reset_password(&request.token, &request.password)
        .await?;
    Ok(StatusCode::OK)
}

/// `POST /auth/request-verify-token`, 202 for the same reason as forgot-password
pub async fn request_verify_token(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<EmailRequest>,
) -> ApiResult<StatusCode> {
    match state.auth.users.request_verify(&request.email).await {
        Ok(())
        | Err(AuthError::UserNotExists)
        | Err(AuthError::UserInactive)
        | Err(AuthError::VerifyUserAlreadyVerified) => Ok(StatusCode::ACCEPTED),
        Err(e) => Err(e.into()),
    }
}

/// `POST /auth/verify`
pub async fn verify(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<VerifyRequest>,
) -> ApiResult<Json<UserRead>> {
    let user = state.auth.users.verify(&request.token).await?;
    Ok(Json(user.into()))
}

