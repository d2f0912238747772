//! Resolves the current user from a request across ordered backends

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::HeaderMap;
use uuid::Uuid;

use gatehouse_db::{CredentialStore, User};

use crate::backend::AuthenticationBackend;
use crate::error::{AuthError, AuthResult};

/// Predicates the current user must satisfy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Return `None` instead of failing
    pub optional: bool,
    pub active: bool,
    pub verified: bool,
    pub superuser: bool,
    /// Satisfied by admins and superusers
    pub admin: bool,
}

impl Requirements {
    /// Any authenticated, active user
    pub fn active() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    pub fn superuser() -> Self {
        Self {
            superuser: true,
            ..Self::active()
        }
    }

    pub fn admin() -> Self {
        Self {
            admin: true,
            ..Self::active()
        }
    }

    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Whether any predicate needs the stored user
    fn needs_user(&self) -> bool {
        self.active || self.verified || self.superuser || self.admin
    }

    /// Apply the predicates to a resolved user
    fn check(&self, user: &User) -> AuthResult<()> {
        if (self.active && !user.is_active) || (self.verified && !user.is_verified) {
            return Err(AuthError::Unauthorized);
        }
        if (self.superuser && !user.is_superuser)
            || (self.admin && !(user.is_admin || user.is_superuser))
        {
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }
}

pub struct Authenticator {
    backends: Vec<Arc<AuthenticationBackend>>,
    store: Arc<dyn CredentialStore>,
}

impl Authenticator {
    /// Backends are tried in order; their names must be unique
    pub fn new(
        backends: Vec<Arc<AuthenticationBackend>>,
        store: Arc<dyn CredentialStore>,
    ) -> AuthResult<Self> {
        let mut seen = HashSet::new();
        for backend in &backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(AuthError::DuplicateBackendNames(backend.name.clone()));
            }
        }
        Ok(Self { backends, store })
    }

    pub fn backends(&self) -> &[Arc<AuthenticationBackend>] {
        &self.backends
    }

    pub fn backend(&self, name: &str) -> Option<&Arc<AuthenticationBackend>> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub async fn current_user(
        &self,
        headers: &HeaderMap,
        requirements: Requirements,
    ) -> AuthResult<Option<User>> {
        Ok(self
            .current_user_token(headers, requirements)
            .await?
            .map(|(user, _)| user))
    }

    /// Current user together with the raw token that identified them
    pub async fn current_user_token(
        &self,
        headers: &HeaderMap,
        requirements: Requirements,
    ) -> AuthResult<Option<(User, String)>> {
        let found = self.first_match(self.backends.iter().map(Arc::as_ref), headers).await;
        Self::enforce(found, requirements)
    }

    /// Id of the current user. Unless a user predicate is requested the id
    /// comes straight from the token and the user is never loaded.
    pub async fn current_user_uuid(
        &self,
        headers: &HeaderMap,
        requirements: Requirements,
    ) -> AuthResult<Option<Uuid>> {
        if requirements.needs_user() {
            return Ok(self
                .current_user(headers, requirements)
                .await?
                .map(|user| user.id));
        }

        for backend in &self.backends {
            let Some(token) = backend.transport.extract_token(headers) else {
                continue;
            };
            if let Some(user_id) = backend.strategy.read_subject(&token).await {
                return Ok(Some(user_id));
            }
        }
        if requirements.optional {
            Ok(None)
        } else {
            Err(AuthError::Unauthorized)
        }
    }

    /// Like [`Self::current_user_token`] but restricted to one backend
    pub async fn authenticate_with(
        &self,
        backend: &AuthenticationBackend,
        headers: &HeaderMap,
        requirements: Requirements,
    ) -> AuthResult<Option<(User, String)>> {
        let found = self.first_match(std::iter::once(backend), headers).await;
        Self::enforce(found, requirements)
    }

    async fn first_match<'a>(
        &self,
        backends: impl Iterator<Item = &'a AuthenticationBackend>,
        headers: &HeaderMap,
    ) -> Option<(User, String)> {
        for backend in backends {
            let Some(token) = backend.transport.extract_token(headers) else {
                continue;
            };
            if let Some(user) = backend
                .strategy
                .read_token(Some(&token), self.store.as_ref())
                .await
            {
                return Some((user, token));
            }
        }
        None
    }

    fn enforce(
        found: Option<(User, String)>,
        requirements: Requirements,
    ) -> AuthResult<Option<(User, String)>> {
        let outcome = match found {
            None => Err(AuthError::Unauthorized),
            Some((user, token)) => requirements.check(&user).map(|()| (user, token)),
        };
        match outcome {
            Ok(found) => Ok(Some(found)),
            Err(_) if requirements.optional => Ok(None),
            Err(e) => Err(e),
        }
    }
}
