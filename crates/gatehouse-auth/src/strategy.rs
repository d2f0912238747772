//! Token persistence strategies
//!
//! A strategy turns a user into an opaque token and back. Reading never
//! fails: any problem (bad signature, revoked, unknown user, backend error)
//! yields `None`, which the authenticator turns into 401.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::RngCore;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use gatehouse_db::cache::keys;
use gatehouse_db::{
    AccessTokenRecord, AccessTokenRepository, CacheBackend, CredentialStore, User, UserRepository,
};

use crate::blacklist::Blacklist;
use crate::codec::{subject, Claims, TokenCodec};
use crate::error::{AuthError, AuthResult};

/// Random URL-safe token (32 bytes of entropy)
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub enum Strategy {
    Jwt(JwtStrategy),
    Database(DatabaseStrategy),
    Cache(CacheStrategy),
}

/// Self-contained signed tokens, optionally revocable through a [`Blacklist`]
pub struct JwtStrategy {
    codec: TokenCodec,
    lifetime: Option<Duration>,
    audience: String,
    blacklist: Option<Blacklist>,
}

impl JwtStrategy {
    pub fn new(codec: TokenCodec, lifetime: Option<Duration>, audience: impl Into<String>) -> Self {
        Self {
            codec,
            lifetime,
            audience: audience.into(),
            blacklist: None,
        }
    }

    pub fn with_blacklist(mut self, blacklist: Blacklist) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn blacklist(&self) -> Option<&Blacklist> {
        self.blacklist.as_ref()
    }

    async fn verified_subject(&self, token: &str) -> Option<Uuid> {
        let claims = self.codec.verify(token, &self.audience).ok()?;
        let user_id = subject(&claims)?;

        if let Some(blacklist) = &self.blacklist {
            match blacklist.check(token).await {
                Ok(false) => {}
                Ok(true) => {
                    debug!(user_id = %user_id, "Rejected blacklisted token");
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "Blacklist lookup failed; rejecting token");
                    return None;
                }
            }
        }
        Some(user_id)
    }
}

/// Random tokens persisted in the credential store
pub struct DatabaseStrategy {
    store: Arc<dyn CredentialStore>,
    lifetime: Option<Duration>,
}

impl DatabaseStrategy {
    pub fn new(store: Arc<dyn CredentialStore>, lifetime: Option<Duration>) -> Self {
        Self { store, lifetime }
    }

    async fn record(&self, token: &str) -> Option<AccessTokenRecord> {
        let max_age = self
            .lifetime
            .and_then(|l| chrono::Duration::from_std(l).ok());
        match self.store.get_access_token(token, max_age).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Access token lookup failed");
                None
            }
        }
    }
}

/// Random tokens mapped to user ids in the cache, expiring with their TTL
pub struct CacheStrategy {
    cache: Arc<dyn CacheBackend>,
    lifetime: Option<Duration>,
}

impl CacheStrategy {
    pub fn new(cache: Arc<dyn CacheBackend>, lifetime: Option<Duration>) -> Self {
        Self { cache, lifetime }
    }

    fn key(token: &str) -> String {
        format!("{}{}", keys::TOKEN, token)
    }

    async fn user_id(&self, token: &str) -> Option<Uuid> {
        match self.cache.get_string(&Self::key(token)).await {
            Ok(value) => value.and_then(|v| Uuid::parse_str(&v).ok()),
            Err(e) => {
                warn!(error = %e, "Token cache lookup failed");
                None
            }
        }
    }
}

async fn load_user(store: &dyn CredentialStore, id: Uuid) -> Option<User> {
    match store.get_user(id).await {
        Ok(user) => user,
        Err(e) => {
            warn!(user_id = %id, error = %e, "User lookup failed");
            None
        }
    }
}

impl Strategy {
    /// Resolve a token to its user
    pub async fn read_token(&self, token: Option<&str>, store: &dyn CredentialStore) -> Option<User> {
        let token = token?;
        let user_id = self.read_subject(token).await?;
        load_user(store, user_id).await
    }

    /// User id behind a token, without loading the user
    pub async fn read_subject(&self, token: &str) -> Option<Uuid> {
        match self {
            Self::Jwt(s) => s.verified_subject(token).await,
            Self::Database(s) => s.record(token).await.map(|r| r.user_id),
            Self::Cache(s) => s.user_id(token).await,
        }
    }

    /// Issue a token for `user`. `extra_claims` only applies to JWT.
    pub async fn write_token(&self, user: &User, extra_claims: Option<Claims>) -> AuthResult<String> {
        match self {
            Self::Jwt(s) => {
                let mut claims = extra_claims.unwrap_or_default();
                claims.insert("sub".into(), Value::String(user.id.to_string()));
                let ttl = s.lifetime.map(|l| l.as_secs() as i64);
                s.codec.issue(claims, ttl, &s.audience)
            }
            Self::Database(s) => {
                let record = AccessTokenRecord {
                    token: generate_token(),
                    user_id: user.id,
                    created_at: Utc::now(),
                };
                let record = s.store.create_access_token(record).await?;
                Ok(record.token)
            }
            Self::Cache(s) => {
                let token = generate_token();
                s.cache
                    .set_string(&CacheStrategy::key(&token), &user.id.to_string(), s.lifetime)
                    .await?;
                Ok(token)
            }
        }
    }

    /// Invalidate `token`. JWT without a blacklist cannot do this and
    /// reports [`AuthError::DestroyNotSupported`].
    pub async fn destroy_token(&self, token: &str, user: &User) -> AuthResult<()> {
        match self {
            Self::Jwt(s) => match &s.blacklist {
                Some(blacklist) => {
                    blacklist.enlist(token).await?;
                    debug!(user_id = %user.id, "Token blacklisted");
                    Ok(())
                }
                None => Err(AuthError::DestroyNotSupported),
            },
            Self::Database(s) => {
                s.store.delete_access_token(token).await?;
                Ok(())
            }
            Self::Cache(s) => {
                s.cache.delete(&CacheStrategy::key(token)).await?;
                Ok(())
            }
        }
    }
}
