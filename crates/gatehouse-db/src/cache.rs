//! Key-value cache for revocation sets, rate-limit counters and opaque tokens
//!
//! [`CacheBackend`] exposes only the shapes the engine needs: string values,
//! string sets and fixed-window counters. Every operation is atomic per key.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::{redis, Pool as RedisPool};
use tokio::time::Instant;

use crate::DbResult;

/// Cache key prefixes
pub mod keys {
    pub const BLACKLIST: &str = "blacklist:";
    pub const RATE_LIMIT: &str = "rate:";
    pub const TOKEN: &str = "token:";
}

/// State of a fixed-window counter after an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Hits in the current window, including this one
    pub count: u64,
    /// Time left until the window resets
    pub ttl: Duration,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_string(&self, key: &str) -> DbResult<Option<String>>;

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> DbResult<()>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> DbResult<bool>;

    /// Add `member` to the set at `key` and (re)arm the key's expiry
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> DbResult<()>;

    /// Whether `member` belongs to any of the sets
    async fn set_contains(&self, keys: &[String], member: &str) -> DbResult<bool>;

    /// Remove `member` from every listed set
    async fn set_remove(&self, keys: &[String], member: &str) -> DbResult<()>;

    /// Increment the counter at `key`. The first hit opens a window of
    /// length `window`; the counter resets once it elapses.
    async fn incr_window(&self, key: &str, window: Duration) -> DbResult<WindowCount>;

    async fn ping(&self) -> DbResult<()>;

    /// Evict expired entries; returns how many were dropped.
    /// Backends with native expiry have nothing to do.
    async fn purge_expired(&self) -> DbResult<usize> {
        Ok(0)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Single-process cache backed by a `DashMap`.
///
/// Expiry uses `tokio::time::Instant`, so tests can drive windows with
/// `tokio::time::pause` and `advance`.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get_string(&self, key: &str) -> DbResult<Option<String>> {
        Ok(match self.live(key) {
            Some(Entry { value: Value::Str(s), .. }) => Some(s),
            _ => None,
        })
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> DbResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, e)| !e.is_expired(now)))
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> DbResult<()> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        if entry.is_expired(now) || !matches!(entry.value, Value::Set(_)) {
            entry.value = Value::Set(HashSet::new());
        }
        if let Value::Set(members) = &mut entry.value {
            members.insert(member.to_string());
        }
        entry.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn set_contains(&self, keys: &[String], member: &str) -> DbResult<bool> {
        Ok(keys.iter().any(|key| {
            matches!(
                self.live(key),
                Some(Entry { value: Value::Set(members), .. }) if members.contains(member)
            )
        }))
    }

    async fn set_remove(&self, keys: &[String], member: &str) -> DbResult<()> {
        for key in keys {
            if let Some(mut entry) = self.entries.get_mut(key) {
                if let Value::Set(members) = &mut entry.value {
                    members.remove(member);
                }
            }
        }
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> DbResult<WindowCount> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: Some(now + window),
        });
        if entry.is_expired(now) || !matches!(entry.value, Value::Counter(_)) {
            entry.value = Value::Counter(0);
            entry.expires_at = Some(now + window);
        }

        let count = match &mut entry.value {
            Value::Counter(c) => {
                *c += 1;
                *c
            }
            _ => 1,
        };
        let ttl = entry
            .expires_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(window);

        Ok(WindowCount { count, ttl })
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn purge_expired(&self) -> DbResult<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

// ============================================================================
// Redis backend
// ============================================================================

/// Redis-backed cache shared by every process of a deployment
#[derive(Clone)]
pub struct RedisCache {
    pool: RedisPool,
}

impl RedisCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

fn millis(d: Duration) -> u64 {
    (d.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get_string(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let deleted: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(deleted > 0)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(key)
            .arg(member)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_contains(&self, keys: &[String], member: &str) -> DbResult<bool> {
        if keys.is_empty() {
            return Ok(false);
        }
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("SISMEMBER").arg(key).arg(member);
        }
        let hits: Vec<bool> = pipe.query_async(&mut conn).await?;
        Ok(hits.into_iter().any(|hit| hit))
    }

    async fn set_remove(&self, keys: &[String], member: &str) -> DbResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.cmd("SREM").arg(key).arg(member).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> DbResult<WindowCount> {
        let mut conn = self.pool.get().await?;

        // SET NX PX opens the window only for the first hit; INCR and PTTL
        // run in the same MULTI block so concurrent callers never lose counts.
        let (count, pttl): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("NX")
            .arg("PX")
            .arg(millis(window))
            .ignore()
            .cmd("INCR")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        let ttl = if pttl > 0 {
            Duration::from_millis(pttl as u64)
        } else {
            window
        };
        Ok(WindowCount { count: count.max(0) as u64, ttl })
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
