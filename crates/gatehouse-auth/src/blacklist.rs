//! Token revocation registry
//!
//! Revoked tokens go into one cache set per UTC calendar day
//! (`blacklist:YYYY-MM-DD`). A token counts as revoked when it sits in
//! today's or yesterday's set, so the effective lookback is between one and
//! two days. Sets expire on their own after three days; [`Blacklist::destroy`]
//! drops the set from two days ago eagerly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate};
use tracing::debug;

use gatehouse_db::cache::keys;
use gatehouse_db::CacheBackend;

use crate::clock::{Clock, SystemClock};
use crate::error::AuthResult;

const SET_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

#[derive(Clone)]
pub struct Blacklist {
    cache: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
}

impl Blacklist {
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self::with_clock(cache, Arc::new(SystemClock))
    }

    pub fn with_clock(cache: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    fn key(date: NaiveDate) -> String {
        format!("{}{}", keys::BLACKLIST, date.format("%Y-%m-%d"))
    }

    fn lookback_keys(&self) -> Vec<String> {
        let today = self.clock.today();
        vec![Self::key(today), Self::key(today - ChronoDuration::days(1))]
    }

    /// Revoke `token`
    pub async fn enlist(&self, token: &str) -> AuthResult<()> {
        let key = Self::key(self.clock.today());
        self.cache.set_add(&key, token, SET_TTL).await?;
        Ok(())
    }

    /// Whether `token` was revoked today or yesterday
    pub async fn check(&self, token: &str) -> AuthResult<bool> {
        Ok(self.cache.set_contains(&self.lookback_keys(), token).await?)
    }

    /// Undo a revocation
    pub async fn forget(&self, token: &str) -> AuthResult<()> {
        self.cache.set_remove(&self.lookback_keys(), token).await?;
        Ok(())
    }

    /// Drop the set that fell out of the lookback window
    pub async fn destroy(&self) -> AuthResult<()> {
        let stale = Self::key(self.clock.today() - ChronoDuration::days(2));
        let existed = self.cache.delete(&stale).await?;
        debug!(key = %stale, existed, "Dropped stale blacklist set");
        Ok(())
    }
}
