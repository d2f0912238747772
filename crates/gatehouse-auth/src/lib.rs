//! Gatehouse authentication engine
//!
//! - **Strategies**: JWT (optionally revocable), database-backed and
//!   cache-backed opaque tokens
//! - **Transports**: bearer bodies and HttpOnly cookies
//! - **Backends**: named transport + strategy pairs, tried in order by the
//!   [`Authenticator`]
//! - **Users**: registration, login, reset and verification flows
//! - **RBAC**: user → roles → access rights
//! - **Rate limiting**: fixed windows per route and caller
//! - **OAuth2**: authorization-code federation
//!
//! # Architecture
//!
//! ```text
//! Request ─► RateLimiter ─► Authenticator ─► handler
//!                               │
//!              ┌────────────────┼────────────────┐
//!              ▼                ▼                ▼
//!        Backend "jwt"    Backend "cookie"   Backend "jwt-refresh"
//!        Bearer + Jwt     Cookie + Jwt       Bearer + Jwt (refresh aud)
//!              │                │                │
//!              └──── TokenCodec / Blacklist / CredentialStore ──┘
//! ```

pub mod authenticator;
pub mod backend;
pub mod blacklist;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod password;
pub mod rate_limit;
pub mod rbac;
pub mod strategy;
pub mod transport;

pub use authenticator::{Authenticator, Requirements};
pub use backend::AuthenticationBackend;
pub use blacklist::Blacklist;
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{audience, Claims, TokenCodec};
pub use config::{AuthConfig, StrategyKind};
pub use error::{AuthError, AuthResult, ErrorDetail, ErrorResponse};
pub use manager::{LoggingHooks, PurposeToken, UserCreate, UserHooks, UserManager, UserPatch};
pub use oauth::{GenericOAuthClient, OAuthProvider, OAuthRegistry, OAuthState};
pub use password::{Argon2Hasher, PasswordHasher, PasswordPolicy};
pub use rate_limit::{Identifier, RateLimiter, Window};
pub use rbac::{AccessRightManager, RoleManager};
pub use strategy::{CacheStrategy, DatabaseStrategy, JwtStrategy, Strategy};
pub use transport::{BearerKind, Transport};

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use gatehouse_db::{CacheBackend, CredentialStore};

/// Backend names
pub mod backends {
    pub const ACCESS: &str = "jwt";
    pub const REFRESH: &str = "jwt-refresh";
    pub const COOKIE: &str = "cookie";
}

/// Claim carrying the user's access right ids
pub const ACCESS_RIGHT_IDS: &str = "access_right_ids";

/// Every authentication component, wired from one [`AuthConfig`]
pub struct AuthService {
    pub access: Arc<AuthenticationBackend>,
    pub refresh: Arc<AuthenticationBackend>,
    pub cookie: Option<Arc<AuthenticationBackend>>,
    /// Access and cookie backends; refresh tokens never authenticate requests
    pub authenticator: Authenticator,
    pub users: UserManager,
    pub roles: RoleManager,
    pub rights: AccessRightManager,
    pub blacklist: Option<Blacklist>,
    pub login_limiter: Option<RateLimiter>,
    pub refresh_limiter: Option<RateLimiter>,
    pub rbac_limiter: Option<RateLimiter>,
    pub oauth: OAuthRegistry,
    pub oauth_state: Option<OAuthState>,
    config: AuthConfig,
}

impl AuthService {
    pub fn from_config(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn CacheBackend>,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|errors| AuthError::Config(errors.join("; ")))?;

        let jwt = &config.jwt;
        let access_codec = TokenCodec::new(
            &jwt.access_secret,
            &jwt.algorithm,
            jwt.access_public_key.as_deref(),
        )?;
        let refresh_codec = TokenCodec::new(
            &jwt.refresh_secret,
            &jwt.algorithm,
            jwt.refresh_public_key.as_deref(),
        )?;

        let blacklist = config
            .blacklist
            .enabled
            .then(|| Blacklist::new(cache.clone()));
        let revocable = |strategy: JwtStrategy| match &blacklist {
            Some(blacklist) => strategy.with_blacklist(blacklist.clone()),
            None => strategy,
        };

        let access_lifetime = Some(jwt.access_token_lifetime);
        let access_strategy = match jwt.strategy {
            StrategyKind::Jwt => Strategy::Jwt(revocable(JwtStrategy::new(
                access_codec.clone(),
                access_lifetime,
                audience::ACCESS,
            ))),
            StrategyKind::Database => {
                Strategy::Database(DatabaseStrategy::new(store.clone(), access_lifetime))
            }
            StrategyKind::Cache => Strategy::Cache(CacheStrategy::new(cache.clone(), access_lifetime)),
        };
        let access = Arc::new(AuthenticationBackend::new(
            backends::ACCESS,
            Transport::bearer("/auth/jwt/login", BearerKind::Access),
            access_strategy,
        ));

        let refresh = Arc::new(AuthenticationBackend::new(
            backends::REFRESH,
            Transport::bearer("/auth/jwt/refresh-login", BearerKind::Refresh),
            Strategy::Jwt(revocable(JwtStrategy::new(
                refresh_codec,
                Some(jwt.refresh_token_lifetime),
                audience::REFRESH,
            ))),
        ));

        let cookie = config.cookie.enabled.then(|| {
            let lifetime = config.cookie.max_age.or(access_lifetime);
            Arc::new(AuthenticationBackend::new(
                backends::COOKIE,
                Transport::cookie(config.cookie.clone()),
                Strategy::Jwt(revocable(JwtStrategy::new(
                    access_codec.clone(),
                    lifetime,
                    audience::ACCESS,
                ))),
            ))
        });

        let mut request_backends = vec![access.clone()];
        request_backends.extend(cookie.clone());
        let authenticator = Authenticator::new(request_backends, store.clone())?;

        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher::new(config.password.clone())?);
        let users = UserManager::new(
            store.clone(),
            hasher,
            PurposeToken::new(TokenCodec::hs256(&config.reset.secret), config.reset.lifetime),
            PurposeToken::new(TokenCodec::hs256(&config.verify.secret), config.verify.lifetime),
        )?
        .with_policy(PasswordPolicy::from(&config.password))
        .require_verified_login(config.require_verified_login);

        let limits = &config.rate_limit;
        let login_limiter = limits.enabled.then(|| {
            RateLimiter::new(
                cache.clone(),
                "auth:login",
                limits.login.limit,
                Window::from(limits.login.window),
            )
        });
        let refresh_limiter = limits.enabled.then(|| {
            RateLimiter::new(
                cache.clone(),
                "auth:refresh",
                limits.refresh.limit,
                Window::from(limits.refresh.window),
            )
            .identify_by(Identifier::UserId(refresh.clone()))
        });
        let rbac_limiter = limits.enabled.then(|| {
            RateLimiter::new(
                cache.clone(),
                "rbac",
                limits.rbac.limit,
                Window::from(limits.rbac.window),
            )
            .identify_by(Identifier::UserId(access.clone()))
        });

        let mut oauth = OAuthRegistry::new();
        for provider in &config.oauth.providers {
            oauth.register(Arc::new(GenericOAuthClient::new(provider.clone())?));
        }
        let oauth_state = (!oauth.is_empty()).then(|| {
            OAuthState::new(
                TokenCodec::hs256(&config.oauth.state_secret),
                config.oauth.state_lifetime,
            )
        });

        info!(
            strategy = ?jwt.strategy,
            cookie = config.cookie.enabled,
            blacklist = config.blacklist.enabled,
            rate_limit = limits.enabled,
            oauth_providers = config.oauth.providers.len(),
            "Authentication service ready"
        );

        Ok(Self {
            access,
            refresh,
            cookie,
            authenticator,
            users,
            roles: RoleManager::new(store.clone()),
            rights: AccessRightManager::new(store),
            blacklist,
            login_limiter,
            refresh_limiter,
            rbac_limiter,
            oauth,
            oauth_state,
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Extra claims for tokens issued to `user_id`: the current access right ids
    pub async fn access_claims(&self, user_id: Uuid) -> AuthResult<Claims> {
        let ids = self.rights.access_right_ids(user_id).await?;
        let ids = ids.into_iter().map(|id| Value::String(id.to_string())).collect();
        Ok(codec::claims([(ACCESS_RIGHT_IDS, Value::Array(ids))]))
    }

    /// Drop the oldest revocation set
    pub async fn collect_garbage(&self) -> AuthResult<()> {
        if let Some(blacklist) = &self.blacklist {
            blacklist.destroy().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{MemoryCache, MemoryStore};

    pub(crate) fn test_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.jwt.access_secret = "access-secret-key-for-tests-min-32-bytes!".into();
        config.jwt.refresh_secret = "refresh-secret-key-for-tests-min-32-bytes".into();
        config.reset.secret = "reset-secret-key-for-tests-min-32-bytes!!".into();
        config.verify.secret = "verify-secret-key-for-tests-min-32-bytes!".into();
        config.password.memory_cost = 4096;
        config.password.time_cost = 1;
        config
    }

    fn build(config: AuthConfig) -> AuthResult<AuthService> {
        AuthService::from_config(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCache::new()),
        )
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = build(AuthConfig::default());
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_default_wiring() {
        let service = build(test_config()).unwrap();
        let names: Vec<_> = service
            .authenticator
            .backends()
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(names, vec![backends::ACCESS]);
        assert!(service.cookie.is_none());
        assert!(service.blacklist.is_some());
        assert!(service.oauth_state.is_none());
    }

    #[test]
    fn test_cookie_backend_is_appended() {
        let mut config = test_config();
        config.cookie.enabled = true;
        let service = build(config).unwrap();
        assert!(service.authenticator.backend(backends::COOKIE).is_some());
        assert!(service.authenticator.backend(backends::REFRESH).is_none());
    }

    #[tokio::test]
    async fn test_access_claims_list_right_ids() {
        let service = build(test_config()).unwrap();
        let user = service
            .users
            .register(UserCreate::new("ann@example.com", "correct-horse-battery"), true)
            .await
            .unwrap();

        let claims = service.access_claims(user.id).await.unwrap();
        assert_eq!(claims[ACCESS_RIGHT_IDS], Value::Array(vec![]));

        let role = service.roles.create("reader").await.unwrap();
        let right = service.rights.create("read").await.unwrap();
        service.rights.assign_role_access_right(role.id, right.id).await.unwrap();
        service.roles.assign_user_role(user.id, role.id).await.unwrap();

        let claims = service.access_claims(user.id).await.unwrap();
        assert_eq!(
            claims[ACCESS_RIGHT_IDS],
            Value::Array(vec![Value::String(right.id.to_string())])
        );
    }
}
