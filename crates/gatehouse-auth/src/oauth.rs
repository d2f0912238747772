//! OAuth2 authorization-code federation
//!
//! Providers are configured by endpoint URLs; [`GenericOAuthClient`] speaks
//! the plain authorization-code grant over `reqwest`. The `state` round-trip
//! is a short-lived signed token with its own audience.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use gatehouse_db::NewOAuthAccount;

use crate::codec::{audience, Claims, TokenCodec};
use crate::config::OAuthProviderConfig;
use crate::error::{AuthError, AuthResult};

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl OAuthToken {
    /// Absolute expiry as a unix timestamp
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_in.map(|secs| Utc::now().timestamp() + secs)
    }
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &str;

    /// URL the user agent is sent to
    fn authorization_url(&self, state: &str) -> AuthResult<String>;

    /// Exchange an authorization code
    async fn get_access_token(&self, code: &str) -> AuthResult<OAuthToken>;

    /// Provider account id and e-mail, if the provider shares it
    async fn get_id_email(&self, access_token: &str) -> AuthResult<(String, Option<String>)>;
}

pub struct GenericOAuthClient {
    config: OAuthProviderConfig,
    http: reqwest::Client,
}

impl GenericOAuthClient {
    pub fn new(config: OAuthProviderConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Config(format!("OAuth HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    fn provider_error(&self, what: &str, detail: impl std::fmt::Display) -> AuthError {
        warn!(provider = %self.config.name, error = %detail, "{} failed", what);
        AuthError::OAuthProvider(format!("{}: {} failed", self.config.name, what))
    }
}

/// Stringify an id that providers send either as a string or a number
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl OAuthProvider for GenericOAuthClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn authorization_url(&self, state: &str) -> AuthResult<String> {
        let scope = self.config.scopes.join(" ");
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("state", state),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }
        let url = Url::parse_with_params(&self.config.authorize_endpoint, &params)
            .map_err(|e| AuthError::Config(format!("authorize endpoint: {}", e)))?;
        Ok(url.into())
    }

    async fn get_access_token(&self, code: &str) -> AuthResult<OAuthToken> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(&self.config.access_token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| self.provider_error("token exchange", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.provider_error("token exchange", status));
        }
        let token = response
            .json::<OAuthToken>()
            .await
            .map_err(|e| self.provider_error("token decoding", e))?;
        debug!(provider = %self.config.name, "Authorization code exchanged");
        Ok(token)
    }

    async fn get_id_email(&self, access_token: &str) -> AuthResult<(String, Option<String>)> {
        let response = self
            .http
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.provider_error("userinfo", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.provider_error("userinfo", status));
        }
        let profile = response
            .json::<Value>()
            .await
            .map_err(|e| self.provider_error("userinfo decoding", e))?;

        let id = profile
            .get(&self.config.id_field)
            .and_then(id_to_string)
            .ok_or_else(|| self.provider_error("userinfo", "missing account id"))?;
        let email = profile
            .get(&self.config.email_field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok((id, email))
    }
}

/// Turn an authorization code into the account record to store
pub async fn account_from_code(
    provider: &dyn OAuthProvider,
    code: &str,
) -> AuthResult<NewOAuthAccount> {
    let token = provider.get_access_token(code).await?;
    let (account_id, email) = provider.get_id_email(&token.access_token).await?;
    let account_email = email.ok_or(AuthError::OAuthNotAvailableEmail)?;

    Ok(NewOAuthAccount {
        oauth_name: provider.name().to_string(),
        expires_at: token.expires_at(),
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        account_id,
        account_email,
    })
}

/// Signed, expiring `state` parameter
#[derive(Debug, Clone)]
pub struct OAuthState {
    codec: TokenCodec,
    lifetime: Duration,
}

impl OAuthState {
    pub fn new(codec: TokenCodec, lifetime: Duration) -> Self {
        Self { codec, lifetime }
    }

    pub fn issue(&self) -> AuthResult<String> {
        let ttl = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        self.codec.issue(Claims::new(), Some(ttl), audience::OAUTH_STATE)
    }

    pub fn verify(&self, state: &str) -> AuthResult<()> {
        self.codec
            .verify(state, audience::OAUTH_STATE)
            .map(|_| ())
            .map_err(|_| AuthError::OAuthInvalidState)
    }
}

/// Providers by name
#[derive(Clone, Default)]
pub struct OAuthRegistry {
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl OAuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> AuthResult<Arc<dyn OAuthProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::OAuthProviderNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
