//! Application state shared across handlers

use std::sync::Arc;

use tracing::info;

use gatehouse_auth::{AuthConfig, AuthResult, AuthService};
use gatehouse_db::{CacheBackend, CredentialStore, Database, MemoryCache, MemoryStore};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub store: Arc<dyn CredentialStore>,
    pub cache: Arc<dyn CacheBackend>,
    /// Connection pools, when running against PostgreSQL/Redis
    database: Option<Database>,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthService>,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn CacheBackend>,
    ) -> Self {
        Self {
            auth,
            store,
            cache,
            database: None,
        }
    }

    /// State over PostgreSQL and Redis
    pub fn from_database(database: Database, config: AuthConfig) -> AuthResult<Self> {
        let store: Arc<dyn CredentialStore> = Arc::new(database.store());
        let cache: Arc<dyn CacheBackend> = Arc::new(database.cache());
        let auth = Arc::new(AuthService::from_config(config, store.clone(), cache.clone())?);
        Ok(Self {
            auth,
            store,
            cache,
            database: Some(database),
        })
    }

    /// Single-process state (tests, local development)
    pub fn in_memory(config: AuthConfig) -> AuthResult<Self> {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let auth = Arc::new(AuthService::from_config(config, store.clone(), cache.clone())?);
        Ok(Self::new(auth, store, cache))
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Release pooled connections
    pub async fn shutdown(&self) {
        if let Some(database) = &self.database {
            database.pg.close().await;
            database.redis.close();
            info!("Connection pools closed");
        }
    }
}
