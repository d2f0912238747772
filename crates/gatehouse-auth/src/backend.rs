//! Authentication backend: a named transport + strategy pair

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use gatehouse_db::User;

use crate::codec::Claims;
use crate::error::{AuthError, AuthResult};
use crate::strategy::Strategy;
use crate::transport::Transport;

pub struct AuthenticationBackend {
    pub name: String,
    pub transport: Transport,
    pub strategy: Strategy,
}

impl AuthenticationBackend {
    pub fn new(name: impl Into<String>, transport: Transport, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            transport,
            strategy,
        }
    }

    /// Issue a token for `user` and wrap it in the transport's response
    pub async fn login(&self, user: &User, extra_claims: Option<Claims>) -> AuthResult<Response> {
        let token = self.strategy.write_token(user, extra_claims).await?;
        debug!(backend = %self.name, user_id = %user.id, "Token issued");
        self.transport.get_login_response(&token)
    }

    /// Destroy `token` where the strategy can, then clear the client side.
    /// Missing capabilities are not errors here: a strategy that cannot
    /// revoke is skipped and a transport without logout yields 204.
    pub async fn logout(&self, user: &User, token: &str) -> AuthResult<Response> {
        match self.strategy.destroy_token(token, user).await {
            Ok(()) | Err(AuthError::DestroyNotSupported) => {}
            Err(e) => return Err(e),
        }

        match self.transport.get_logout_response() {
            Ok(response) => Ok(response),
            Err(AuthError::LogoutNotSupported) => Ok(StatusCode::NO_CONTENT.into_response()),
            Err(e) => Err(e),
        }
    }
}
