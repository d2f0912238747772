//! Repository traits and their PostgreSQL implementation
//!
//! Every trait is object safe so the engine can hold an
//! `Arc<dyn CredentialStore>` and swap [`PgStore`] for
//! [`MemoryStore`](crate::MemoryStore) in tests.

mod access_right;
mod history;
mod oauth;
mod role;
mod token;
mod user;

pub use access_right::AccessRightRepository;
pub use history::SignInHistoryRepository;
pub use oauth::OAuthAccountRepository;
pub use role::RoleRepository;
pub use token::AccessTokenRepository;
pub use user::UserRepository;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::DbResult;

/// Everything the authentication engine persists
#[async_trait]
pub trait CredentialStore:
    UserRepository
    + RoleRepository
    + AccessRightRepository
    + AccessTokenRepository
    + OAuthAccountRepository
    + SignInHistoryRepository
    + Send
    + Sync
{
    /// Liveness check
    async fn ping(&self) -> DbResult<()>;
}

/// PostgreSQL-backed credential store (tables in schema `identity`)
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
