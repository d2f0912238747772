//! User lifecycle: registration, login, password reset, verification, updates
//!
//! Hooks fire after each successful operation. Delivering reset and
//! verification tokens to the user (mail, SMS...) is the hooks' job; the
//! manager never returns them to HTTP callers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use gatehouse_db::{
    CredentialStore, DbError, NewOAuthAccount, NewUser, OAuthAccountRepository, Page, Pagination,
    SignInHistoryEvent, SignInHistoryRepository, User, UserRepository, UserUpdate,
};

use crate::codec::{audience, claims, string_claim, subject, TokenCodec};
use crate::error::{AuthError, AuthResult};
use crate::password::{PasswordHasher, PasswordPolicy};

const PASSWORD_FINGERPRINT: &str = "password_fgpt";

/// Registration payload
#[derive(Debug, Clone, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
    /// Defaults to the e-mail
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_verified: Option<bool>,
}

impl UserCreate {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            username: None,
            first_name: None,
            last_name: None,
            is_active: None,
            is_superuser: None,
            is_admin: None,
            is_verified: None,
        }
    }
}

/// Partial update payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_verified: Option<bool>,
}

/// Callbacks fired after user lifecycle events.
///
/// The default bodies only log; tokens are never logged.
#[async_trait]
pub trait UserHooks: Send + Sync {
    async fn on_after_register(&self, user: &User) {
        info!(user_id = %user.id, "User registered");
    }

    async fn on_after_login(&self, user: &User) {
        debug!(user_id = %user.id, "User logged in");
    }

    async fn on_after_forgot_password(&self, user: &User, _token: &str) {
        info!(user_id = %user.id, "Password reset requested");
    }

    async fn on_after_reset_password(&self, user: &User) {
        info!(user_id = %user.id, "Password reset");
    }

    async fn on_after_request_verify(&self, user: &User, _token: &str) {
        info!(user_id = %user.id, "Verification requested");
    }

    async fn on_after_verify(&self, user: &User) {
        info!(user_id = %user.id, "User verified");
    }

    async fn on_after_update(&self, user: &User) {
        debug!(user_id = %user.id, "User updated");
    }

    async fn on_after_delete(&self, user: &User) {
        info!(user_id = %user.id, "User deleted");
    }
}

/// Hooks that only log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

impl UserHooks for LoggingHooks {}

/// Codec and lifetime for a single-purpose token (reset, verify)
#[derive(Debug, Clone)]
pub struct PurposeToken {
    pub codec: TokenCodec,
    pub lifetime: Duration,
}

impl PurposeToken {
    pub fn new(codec: TokenCodec, lifetime: Duration) -> Self {
        Self { codec, lifetime }
    }

    fn ttl_seconds(&self) -> i64 {
        i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX)
    }
}

pub struct UserManager {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    policy: PasswordPolicy,
    reset: PurposeToken,
    verify: PurposeToken,
    require_verified_login: bool,
    hooks: Arc<dyn UserHooks>,
    /// Verified against when the user is unknown, so both paths cost one hash
    dummy_hash: String,
}

/// `hex(sha256(hashed_password))`: invalidates reset tokens once the password changes
fn password_fingerprint(hashed_password: &str) -> String {
    hex::encode(Sha256::digest(hashed_password.as_bytes()))
}

impl UserManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        reset: PurposeToken,
        verify: PurposeToken,
    ) -> AuthResult<Self> {
        let dummy_hash = hasher.hash(&hasher.generate())?;
        Ok(Self {
            store,
            hasher,
            policy: PasswordPolicy::default(),
            reset,
            verify,
            require_verified_login: false,
            hooks: Arc::new(LoggingHooks),
            dummy_hash,
        })
    }

    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn UserHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn require_verified_login(mut self, required: bool) -> Self {
        self.require_verified_login = required;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn hasher(&self) -> &Arc<dyn PasswordHasher> {
        &self.hasher
    }

    /// Argon2 is CPU-bound; keep it off the async workers
    async fn hash_password(&self, password: &str) -> AuthResult<String> {
        let hasher = self.hasher.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("password hashing task: {}", e)))?
    }

    async fn verify_password(
        &self,
        password: &str,
        hashed: &str,
    ) -> AuthResult<(bool, Option<String>)> {
        let hasher = self.hasher.clone();
        let password = Zeroizing::new(password.to_string());
        let hashed = hashed.to_string();
        tokio::task::spawn_blocking(move || hasher.verify_and_update(&password, &hashed))
            .await
            .map_err(|e| AuthError::Internal(format!("password verification task: {}", e)))?
    }

    pub async fn get(&self, id: Uuid) -> AuthResult<User> {
        self.store.get_user(id).await?.ok_or(AuthError::UserNotExists)
    }

    pub async fn get_by_email(&self, email: &str) -> AuthResult<User> {
        self.store
            .get_user_by_email(email)
            .await?
            .ok_or(AuthError::UserNotExists)
    }

    /// Create a user. `safe` ignores the privileged flags of the payload.
    pub async fn register(&self, create: UserCreate, safe: bool) -> AuthResult<User> {
        self.policy
            .validate(&create.password, Some(&create.email))
            .map_err(|e| match e {
                AuthError::InvalidPassword { reason } => AuthError::RegisterInvalidPassword { reason },
                other => other,
            })?;

        if self.store.get_user_by_email(&create.email).await?.is_some() {
            return Err(AuthError::RegisterUserAlreadyExists);
        }

        let hashed = self.hash_password(&create.password).await?;
        let username = create.username.unwrap_or_else(|| create.email.clone());
        let mut new_user = NewUser::new(username, create.email, hashed);
        new_user.first_name = create.first_name;
        new_user.last_name = create.last_name;
        if !safe {
            new_user.is_active = create.is_active.unwrap_or(true);
            new_user.is_superuser = create.is_superuser.unwrap_or(false);
            new_user.is_admin = create.is_admin.unwrap_or(false);
            new_user.is_verified = create.is_verified.unwrap_or(false);
        }

        let user = self.store.create_user(new_user).await.map_err(|e| match e {
            DbError::Duplicate(_) => AuthError::RegisterUserAlreadyExists,
            other => other.into(),
        })?;

        self.hooks.on_after_register(&user).await;
        Ok(user)
    }

    async fn find_login(&self, login: &str) -> AuthResult<Option<User>> {
        if let Some(user) = self.store.get_user_by_email(login).await? {
            return Ok(Some(user));
        }
        Ok(self.store.get_user_by_username(login).await?)
    }

    /// Check a login (username or e-mail) and password.
    ///
    /// Returns `None` on any mismatch. Upgrades the stored hash when the
    /// hasher's parameters changed.
    pub async fn authenticate(&self, login: &str, password: &str) -> AuthResult<Option<User>> {
        let Some(user) = self.find_login(login).await? else {
            let _ = self.verify_password(password, &self.dummy_hash).await?;
            return Ok(None);
        };

        let (verified, upgraded) = self.verify_password(password, &user.hashed_password).await?;
        if !verified {
            return Ok(None);
        }

        if let Some(hashed_password) = upgraded {
            let update = UserUpdate {
                hashed_password: Some(hashed_password),
                ..Default::default()
            };
            debug!(user_id = %user.id, "Upgrading password hash");
            return Ok(Some(self.store.update_user(user.id, &update).await?));
        }

        Ok(Some(user))
    }

    /// [`Self::authenticate`] plus the login predicates
    pub async fn login_user(&self, login: &str, password: &str) -> AuthResult<User> {
        let user = match self.authenticate(login, password).await? {
            Some(user) if user.is_active => user,
            _ => return Err(AuthError::LoginBadCredentials),
        };
        if self.require_verified_login && !user.is_verified {
            return Err(AuthError::LoginUserNotVerified);
        }
        Ok(user)
    }

    /// Record a successful login in the sign-in history.
    ///
    /// The login already succeeded, so a history write failure is logged
    /// and does not fail it.
    pub async fn on_after_login(&self, user: &User, fingerprint: &str) {
        if let Err(e) = self.store.record_sign_in(user.id, fingerprint).await {
            warn!(user_id = %user.id, error = %e, "Failed to record sign-in");
        }
        self.hooks.on_after_login(user).await;
    }

    pub async fn history(&self, user: &User, page: Pagination) -> AuthResult<Page<SignInHistoryEvent>> {
        Ok(self.store.list_sign_ins(user.id, page).await?)
    }

    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let user = self.get_by_email(email).await?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        let token = self.reset.codec.issue(
            claims([
                ("sub", Value::String(user.id.to_string())),
                (
                    PASSWORD_FINGERPRINT,
                    Value::String(password_fingerprint(&user.hashed_password)),
                ),
            ]),
            Some(self.reset.ttl_seconds()),
            audience::RESET_PASSWORD,
        )?;

        self.hooks.on_after_forgot_password(&user, &token).await;
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> AuthResult<User> {
        let data = self
            .reset
            .codec
            .verify(token, audience::RESET_PASSWORD)
            .map_err(|_| AuthError::ResetPasswordBadToken)?;
        let user_id = subject(&data).ok_or(AuthError::ResetPasswordBadToken)?;
        let fingerprint =
            string_claim(&data, PASSWORD_FINGERPRINT).ok_or(AuthError::ResetPasswordBadToken)?;

        let user = match self.store.get_user(user_id).await? {
            Some(user) => user,
            None => return Err(AuthError::ResetPasswordBadToken),
        };

        let current = password_fingerprint(&user.hashed_password);
        if !bool::from(current.as_bytes().ct_eq(fingerprint.as_bytes())) {
            return Err(AuthError::ResetPasswordBadToken);
        }
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        self.policy.validate(password, Some(&user.email))?;
        let update = UserUpdate {
            hashed_password: Some(self.hash_password(password).await?),
            ..Default::default()
        };
        let user = self.store.update_user(user.id, &update).await?;

        self.hooks.on_after_reset_password(&user).await;
        Ok(user)
    }

    pub async fn request_verify(&self, email: &str) -> AuthResult<()> {
        let user = self.get_by_email(email).await?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        if user.is_verified {
            return Err(AuthError::VerifyUserAlreadyVerified);
        }

        let token = self.verify.codec.issue(
            claims([
                ("sub", Value::String(user.id.to_string())),
                ("email", Value::String(user.email.clone())),
            ]),
            Some(self.verify.ttl_seconds()),
            audience::VERIFY,
        )?;

        self.hooks.on_after_request_verify(&user, &token).await;
        Ok(())
    }

    pub async fn verify(&self, token: &str) -> AuthResult<User> {
        let data = self
            .verify
            .codec
            .verify(token, audience::VERIFY)
            .map_err(|_| AuthError::VerifyUserBadToken)?;
        let user_id = subject(&data).ok_or(AuthError::VerifyUserBadToken)?;
        let email = string_claim(&data, "email").ok_or(AuthError::VerifyUserBadToken)?;

        let user = match self.store.get_user_by_email(email).await? {
            Some(user) if user.id == user_id => user,
            _ => return Err(AuthError::VerifyUserBadToken),
        };
        if user.is_verified {
            return Err(AuthError::VerifyUserAlreadyVerified);
        }

        let update = UserUpdate {
            is_verified: Some(true),
            ..Default::default()
        };
        let user = self.store.update_user(user.id, &update).await?;

        self.hooks.on_after_verify(&user).await;
        Ok(user)
    }

    /// Apply a patch. `safe` restricts it to the self-service fields.
    ///
    /// Changing the e-mail clears `is_verified` unless an unsafe patch sets it.
    pub async fn update(&self, user: &User, patch: UserPatch, safe: bool) -> AuthResult<User> {
        let mut update = UserUpdate {
            first_name: patch.first_name,
            last_name: patch.last_name,
            ..Default::default()
        };

        if let Some(email) = patch.email {
            if !email.eq_ignore_ascii_case(&user.email) {
                if self.store.get_user_by_email(&email).await?.is_some() {
                    return Err(AuthError::UpdateUserEmailAlreadyExists);
                }
                update.is_verified = Some(false);
            }
            update.email = Some(email);
        }

        if let Some(username) = patch.username {
            if !username.eq_ignore_ascii_case(&user.username)
                && self.store.get_user_by_username(&username).await?.is_some()
            {
                return Err(AuthError::UpdateUserUsernameAlreadyExists);
            }
            update.username = Some(username);
        }

        if let Some(password) = patch.password {
            let email = update.email.as_deref().unwrap_or(&user.email);
            self.policy.validate(&password, Some(email))?;
            update.hashed_password = Some(self.hash_password(&password).await?);
        }

        if !safe {
            update.is_active = patch.is_active;
            update.is_superuser = patch.is_superuser;
            update.is_admin = patch.is_admin;
            if patch.is_verified.is_some() {
                update.is_verified = patch.is_verified;
            }
        }

        if update.is_empty() {
            return Ok(user.clone());
        }

        let updated = self
            .store
            .update_user(user.id, &update)
            .await
            .map_err(|e| match e {
                DbError::Duplicate(index) if index.contains("username") => {
                    AuthError::UpdateUserUsernameAlreadyExists
                }
                DbError::Duplicate(_) => AuthError::UpdateUserEmailAlreadyExists,
                DbError::NotFound(_) => AuthError::UserNotExists,
                other => other.into(),
            })?;

        self.hooks.on_after_update(&updated).await;
        Ok(updated)
    }

    pub async fn delete(&self, user: &User) -> AuthResult<()> {
        self.store.delete_user(user.id).await.map_err(|e| match e {
            DbError::NotFound(_) => AuthError::UserNotExists,
            other => other.into(),
        })?;
        self.hooks.on_after_delete(user).await;
        Ok(())
    }

    /// Resolve the local user behind a provider account, creating or
    /// linking one when needed.
    pub async fn oauth_callback(
        &self,
        account: NewOAuthAccount,
        associate_by_email: bool,
        is_verified_by_default: bool,
    ) -> AuthResult<User> {
        if let Some(user) = self
            .store
            .get_user_by_oauth_account(&account.oauth_name, &account.account_id)
            .await?
        {
            let linked = self.store.list_oauth_accounts(user.id).await?;
            if let Some(existing) = linked.iter().find(|a| {
                a.oauth_name == account.oauth_name && a.account_id == account.account_id
            }) {
                self.store.update_oauth_account(existing.id, account).await?;
            }
            return Ok(user);
        }

        if let Some(user) = self.store.get_user_by_email(&account.account_email).await? {
            if !associate_by_email {
                return Err(AuthError::OAuthUserAlreadyExists);
            }
            info!(user_id = %user.id, provider = %account.oauth_name, "Linking OAuth account");
            self.store.add_oauth_account(user.id, account).await?;
            return Ok(user);
        }

        let password = self.hasher.generate();
        let mut new_user = NewUser::new(
            account.account_email.clone(),
            account.account_email.clone(),
            self.hash_password(&password).await?,
        );
        new_user.is_verified = is_verified_by_default;

        let user = self.store.create_user(new_user).await.map_err(|e| match e {
            DbError::Duplicate(_) => AuthError::OAuthUserAlreadyExists,
            other => other.into(),
        })?;
        if let Err(e) = self.store.add_oauth_account(user.id, account).await {
            warn!(user_id = %user.id, error = %e, "Failed to link OAuth account");
            return Err(e.into());
        }

        self.hooks.on_after_register(&user).await;
        Ok(user)
    }
}
