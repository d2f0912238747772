//! Authentication configuration
//!
//! Durations use `humantime` notation in files and env (`15m`, `7days`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    /// Password-reset tokens
    pub reset: TokenSecretConfig,
    /// E-mail verification tokens
    pub verify: TokenSecretConfig,
    pub password: PasswordConfig,
    pub cookie: CookieConfig,
    pub rate_limit: RateLimitConfig,
    pub blacklist: BlacklistConfig,
    pub oauth: OAuthConfig,
    /// Refuse logins of unverified users with `LOGIN_USER_NOT_VERIFIED`
    pub require_verified_login: bool,
}

/// How session tokens are persisted by the access backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Jwt,
    Database,
    Cache,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Storage strategy of the access backend
    pub strategy: StrategyKind,
    /// HMAC secret, or PEM private key for asymmetric algorithms
    pub access_secret: String,
    /// PEM public key (asymmetric algorithms only)
    pub access_public_key: Option<String>,
    pub refresh_secret: String,
    pub refresh_public_key: Option<String>,
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
    /// HS256, HS384, HS512, RS*, PS*, ES256, ES384, EdDSA
    pub algorithm: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Jwt,
            access_secret: String::new(), // Must be set in production
            access_public_key: None,
            refresh_secret: String::new(),
            refresh_public_key: None,
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
            algorithm: "HS256".to_string(),
        }
    }
}

/// Secret and lifetime of a single-purpose token (reset, verify)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSecretConfig {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
}

impl Default for TokenSecretConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            lifetime: Duration::from_secs(60 * 60),
        }
    }
}

/// Password hashing (Argon2id) and policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    pub parallelism: u32,
    /// Output hash length in bytes
    pub hash_length: u32,
    /// Additional secret appended before hashing
    pub pepper: Option<String>,
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    /// Length of passwords generated for OAuth-created accounts
    pub generated_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
            pepper: None,
            min_length: 8,
            max_length: 128,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
            generated_length: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

/// Cookie transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Mount a cookie backend next to the bearer one
    pub enabled: bool,
    pub name: String,
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub httponly: bool,
    pub samesite: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "gatehouse_auth".to_string(),
            max_age: None,
            path: "/".to_string(),
            domain: None,
            secure: true,
            httponly: true,
            samesite: SameSite::Lax,
        }
    }
}

/// Fixed-window limit for one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimit {
    pub limit: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// `POST /auth/jwt/login`, keyed by client IP
    pub login: RouteLimit,
    /// `POST /auth/jwt/refresh`, keyed by user id
    pub refresh: RouteLimit,
    /// Role and access-right routes, keyed by user id
    pub rbac: RouteLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login: RouteLimit {
                limit: 20,
                window: Duration::from_secs(60),
            },
            refresh: RouteLimit {
                limit: 10,
                window: Duration::from_secs(60),
            },
            rbac: RouteLimit {
                limit: 120,
                window: Duration::from_secs(60),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    /// Attach a revocation registry to the JWT strategies
    pub enabled: bool,
    /// How often the server drops expired day sets
    #[serde(with = "humantime_serde")]
    pub gc_interval: Duration,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gc_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// One OAuth2 authorization-code provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_endpoint: String,
    pub access_token_endpoint: String,
    /// Returns the account id and e-mail for an access token
    pub userinfo_endpoint: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Callback URL registered with the provider
    pub redirect_url: String,
    /// JSON field of the userinfo response holding the account id
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_email_field")]
    pub email_field: String,
}

fn default_id_field() -> String {
    "sub".to_string()
}

fn default_email_field() -> String {
    "email".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Signs the `state` parameter
    pub state_secret: String,
    #[serde(with = "humantime_serde")]
    pub state_lifetime: Duration,
    /// Link a provider account to an existing user with the same e-mail
    pub associate_by_email: bool,
    /// Mark OAuth-created users as verified
    pub is_verified_by_default: bool,
    pub providers: Vec<OAuthProviderConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_secret: String::new(),
            state_lifetime: Duration::from_secs(60 * 60),
            associate_by_email: false,
            is_verified_by_default: false,
            providers: Vec::new(),
        }
    }
}

const MIN_SECRET_LEN: usize = 32;

fn check_secret(errors: &mut Vec<String>, name: &str, secret: &str, asymmetric: bool) {
    if secret.is_empty() {
        errors.push(format!("{} must be set", name));
    } else if !asymmetric && secret.len() < MIN_SECRET_LEN {
        errors.push(format!("{} should be at least 256 bits (32 bytes)", name));
    }
}

impl AuthConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let asymmetric = !self.jwt.algorithm.starts_with("HS");

        check_secret(&mut errors, "jwt.access_secret", &self.jwt.access_secret, asymmetric);
        check_secret(&mut errors, "jwt.refresh_secret", &self.jwt.refresh_secret, asymmetric);
        if asymmetric {
            if self.jwt.access_public_key.is_none() {
                errors.push("jwt.access_public_key is required for asymmetric algorithms".into());
            }
            if self.jwt.refresh_public_key.is_none() {
                errors.push("jwt.refresh_public_key is required for asymmetric algorithms".into());
            }
        }
        if !asymmetric && self.jwt.access_secret == self.jwt.refresh_secret {
            errors.push("jwt.access_secret and jwt.refresh_secret must differ".into());
        }
        check_secret(&mut errors, "reset.secret", &self.reset.secret, false);
        check_secret(&mut errors, "verify.secret", &self.verify.secret, false);
        if !self.oauth.providers.is_empty() {
            check_secret(&mut errors, "oauth.state_secret", &self.oauth.state_secret, false);
        }

        if self.password.min_length == 0 || self.password.min_length > self.password.max_length {
            errors.push("password.min_length must be between 1 and password.max_length".into());
        }
        if self.password.time_cost == 0 || self.password.memory_cost < 8 {
            errors.push("password argon2 parameters are too small".into());
        }

        for limit in [&self.rate_limit.login, &self.rate_limit.refresh, &self.rate_limit.rbac] {
            if limit.limit == 0 || limit.window.is_zero() {
                errors.push("rate_limit limits and windows must be positive".into());
                break;
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
