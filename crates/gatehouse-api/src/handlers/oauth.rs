//! OAuth2 authorization-code handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use tracing::info;

use gatehouse_auth::oauth::account_from_code;
use gatehouse_auth::{AuthError, OAuthProvider, OAuthState};

use crate::dto::{AuthorizeResponse, OAuthCallbackQuery};
use crate::error::ApiResult;
use crate::extractors::{ClientInfo, ValidQuery};
use crate::state::AppState;

fn state_codec(state: &AppState) -> Result<&OAuthState, AuthError> {
    state
        .auth
        .oauth_state
        .as_ref()
        .ok_or_else(|| AuthError::Internal("OAuth state signer is not configured".into()))
}

/// `GET /auth/:provider/authorize`
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let provider = state.auth.oauth.get(&provider)?;
    let signed = state_codec(&state)?.issue()?;
    Ok(Json(AuthorizeResponse {
        authorization_url: provider.authorization_url(&signed)?,
    }))
}

/// `GET /auth/:provider/callback?code&state`
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    client: ClientInfo,
    ValidQuery(query): ValidQuery<OAuthCallbackQuery>,
) -> ApiResult<Response> {
    let auth = &state.auth;
    let provider = auth.oauth.get(&provider)?;
    state_codec(&state)?.verify(&query.state)?;

    let account = account_from_code(provider.as_ref(), &query.code).await?;
    let settings = &auth.config().oauth;
    let user = auth
        .users
        .oauth_callback(account, settings.associate_by_email, settings.is_verified_by_default)
        .await?;
    if !user.is_active {
        return Err(AuthError::LoginBadCredentials.into());
    }

    let claims = auth.access_claims(user.id).await?;
    let response = auth.access.login(&user, Some(claims)).await?;
    auth.users.on_after_login(&user, &client.fingerprint()).await;
    info!(user_id = %user.id, provider = %provider.name(), "OAuth login");
    Ok(response)
}
