//! Fixed-window rate limiting per route and caller identity

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::{debug, warn};

use gatehouse_db::cache::keys;
use gatehouse_db::CacheBackend;

use crate::backend::AuthenticationBackend;
use crate::error::{AuthError, AuthResult};

/// Window length built from calendar-ish units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub seconds: u64,
    pub minutes: u64,
    pub hours: u64,
    pub days: u64,
}

impl Window {
    pub fn seconds(seconds: u64) -> Self {
        Self { seconds, ..Self::default() }
    }

    pub fn minutes(minutes: u64) -> Self {
        Self { minutes, ..Self::default() }
    }

    pub fn hours(hours: u64) -> Self {
        Self { hours, ..Self::default() }
    }

    pub fn days(days: u64) -> Self {
        Self { days, ..Self::default() }
    }

    pub fn as_millis(&self) -> u64 {
        1000 * (self.seconds + 60 * self.minutes + 3600 * self.hours + 86_400 * self.days)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

impl From<Duration> for Window {
    fn from(duration: Duration) -> Self {
        Self::seconds(duration.as_secs().max(1))
    }
}

/// How a caller is told apart
#[derive(Clone)]
pub enum Identifier {
    ClientIp,
    /// User id behind the backend's token, falling back to the client IP
    UserId(Arc<AuthenticationBackend>),
}

/// Builds the error returned once the limit is exceeded, given the time left in the window
pub type LimitCallback = Arc<dyn Fn(Duration) -> AuthError + Send + Sync>;

#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn CacheBackend>,
    route: String,
    limit: u64,
    window: Window,
    identifier: Identifier,
    callback: LimitCallback,
}

impl RateLimiter {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        route: impl Into<String>,
        limit: u64,
        window: Window,
    ) -> Self {
        Self {
            cache,
            route: route.into(),
            limit,
            window,
            identifier: Identifier::ClientIp,
            callback: Arc::new(AuthError::too_many_requests),
        }
    }

    pub fn identify_by(mut self, identifier: Identifier) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn on_limit(mut self, callback: LimitCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    async fn identity(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if let Identifier::UserId(backend) = &self.identifier {
            if let Some(token) = backend.transport.extract_token(headers) {
                if let Some(user_id) = backend.strategy.read_subject(&token).await {
                    return format!("user:{}", user_id);
                }
            }
        }
        format!("ip:{}", extract_client_ip(headers, peer))
    }

    /// Count one hit; fails with the callback's error once over the limit.
    ///
    /// A cache failure lets the request through.
    pub async fn check(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> AuthResult<()> {
        let identity = self.identity(headers, peer).await;
        let key = format!("{}{}:{}", keys::RATE_LIMIT, self.route, identity);

        let hits = match self.cache.incr_window(&key, self.window.as_duration()).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(route = %self.route, error = %e, "Rate limit counter unavailable");
                return Ok(());
            }
        };

        if hits.count > self.limit {
            debug!(route = %self.route, identity = %identity, count = hits.count, "Rate limit exceeded");
            return Err((self.callback)(hits.ttl));
        }
        Ok(())
    }
}

/// Client IP from proxy headers, falling back to the socket peer.
///
/// Priority: `CF-Connecting-IP`, `X-Real-IP`, first `X-Forwarded-For` hop, peer.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    header("CF-Connecting-IP")
        .or_else(|| header("X-Real-IP"))
        .or_else(|| header("X-Forwarded-For"))
        .or_else(|| peer.map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
