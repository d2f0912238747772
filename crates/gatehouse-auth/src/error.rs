//! Authentication error types
//!
//! Every variant maps to an HTTP status and a stable machine-readable code.
//! Internal details (`Database`, `Cache`, `Internal`) never reach clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_db::DbError;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Credentials & tokens
    // =========================================================================
    /// Bad signature, expired, wrong audience or malformed payload
    #[error("Invalid token")]
    InvalidToken,

    #[error("Bad credentials")]
    LoginBadCredentials,

    #[error("User is not verified")]
    LoginUserNotVerified,

    #[error("Refresh token is invalid")]
    RefreshBadToken,

    #[error("Reset password token is invalid")]
    ResetPasswordBadToken,

    #[error("Verification token is invalid")]
    VerifyUserBadToken,

    #[error("User is already verified")]
    VerifyUserAlreadyVerified,

    /// Missing or unusable credential, or the user failed `active`/`verified`
    #[error("Unauthorized")]
    Unauthorized,

    /// The user failed a `superuser`/`admin` requirement
    #[error("Forbidden")]
    Forbidden,

    // =========================================================================
    // Users
    // =========================================================================
    #[error("A user with this e-mail already exists")]
    RegisterUserAlreadyExists,

    #[error("Another user already uses this e-mail")]
    UpdateUserEmailAlreadyExists,

    #[error("Another user already uses this username")]
    UpdateUserUsernameAlreadyExists,

    #[error("Invalid password: {reason}")]
    InvalidPassword { reason: String },

    /// Policy rejection on the registration path
    #[error("Invalid password: {reason}")]
    RegisterInvalidPassword { reason: String },

    #[error("User does not exist")]
    UserNotExists,

    #[error("User is inactive")]
    UserInactive,

    // =========================================================================
    // RBAC
    // =========================================================================
    #[error("Role already exists")]
    RoleAlreadyExists,

    #[error("Role does not exist")]
    RoleNotExists,

    #[error("Role is already assigned")]
    RoleAlreadyAssign,

    #[error("Access right already exists")]
    AccessRightAlreadyExists,

    #[error("Access right does not exist")]
    AccessRightNotExists,

    #[error("Access right is already assigned")]
    AccessRightAlreadyAssign,

    #[error("User has no role")]
    UserHasNoRole,

    #[error("User has no access right")]
    UserHasNoRight,

    // =========================================================================
    // Capabilities
    // =========================================================================
    /// The strategy cannot revoke tokens
    #[error("Token destruction is not supported by this strategy")]
    DestroyNotSupported,

    /// The transport has no logout response
    #[error("Logout is not supported by this transport")]
    LogoutNotSupported,

    #[error("Duplicate authentication backend name: {0}")]
    DuplicateBackendNames(String),

    // =========================================================================
    // Rate limiting
    // =========================================================================
    #[error("Too many requests, retry in {retry_after} seconds")]
    TooManyRequests { retry_after: u64 },

    // =========================================================================
    // OAuth
    // =========================================================================
    #[error("Invalid OAuth state")]
    OAuthInvalidState,

    #[error("OAuth provider did not return an e-mail")]
    OAuthNotAvailableEmail,

    #[error("A user with this e-mail already exists")]
    OAuthUserAlreadyExists,

    #[error("Unknown OAuth provider: {0}")]
    OAuthProviderNotFound(String),

    #[error("OAuth provider error: {0}")]
    OAuthProvider(String),

    // =========================================================================
    // Internal
    // =========================================================================
    #[error("Password hashing failed")]
    PasswordHashingFailed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal(String),
}

impl AuthError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 204: empty collections are reported as "no content"
            Self::UserHasNoRole | Self::UserHasNoRight => 204,

            // 400 domain validation
            Self::LoginBadCredentials
            | Self::LoginUserNotVerified
            | Self::ResetPasswordBadToken
            | Self::VerifyUserBadToken
            | Self::VerifyUserAlreadyVerified
            | Self::RegisterUserAlreadyExists
            | Self::UpdateUserEmailAlreadyExists
            | Self::UpdateUserUsernameAlreadyExists
            | Self::InvalidPassword { .. }
            | Self::RegisterInvalidPassword { .. }
            | Self::UserInactive
            | Self::RoleAlreadyExists
            | Self::RoleAlreadyAssign
            | Self::AccessRightAlreadyExists
            | Self::AccessRightAlreadyAssign
            | Self::OAuthInvalidState
            | Self::OAuthNotAvailableEmail
            | Self::OAuthUserAlreadyExists => 400,

            // 401
            Self::InvalidToken | Self::RefreshBadToken | Self::Unauthorized => 401,

            // 403
            Self::Forbidden => 403,

            // 404
            Self::UserNotExists
            | Self::RoleNotExists
            | Self::AccessRightNotExists
            | Self::OAuthProviderNotFound(_) => 404,

            // 429
            Self::TooManyRequests { .. } => 429,

            // 502
            Self::OAuthProvider(_) => 502,

            // 500
            Self::DestroyNotSupported
            | Self::LogoutNotSupported
            | Self::DuplicateBackendNames(_)
            | Self::PasswordHashingFailed
            | Self::Database(_)
            | Self::Cache(_)
            | Self::Config(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Error code for the client (safe to expose)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::LoginBadCredentials => "LOGIN_BAD_CREDENTIALS",
            Self::LoginUserNotVerified => "LOGIN_USER_NOT_VERIFIED",
            Self::RefreshBadToken => "REFRESH_BAD_TOKEN",
            Self::ResetPasswordBadToken => "RESET_PASSWORD_BAD_TOKEN",
            Self::VerifyUserBadToken => "VERIFY_USER_BAD_TOKEN",
            Self::VerifyUserAlreadyVerified => "VERIFY_USER_ALREADY_VERIFIED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::RegisterUserAlreadyExists => "REGISTER_USER_ALREADY_EXISTS",
            Self::UpdateUserEmailAlreadyExists => "UPDATE_USER_EMAIL_ALREADY_EXISTS",
            Self::UpdateUserUsernameAlreadyExists => "UPDATE_USER_USERNAME_ALREADY_EXISTS",
            Self::InvalidPassword { .. } => "INVALID_PASSWORD",
            Self::RegisterInvalidPassword { .. } => "REGISTER_INVALID_PASSWORD",
            Self::UserNotExists => "USER_NOT_EXISTS",
            Self::UserInactive => "USER_INACTIVE",
            Self::RoleAlreadyExists => "ROLE_ALREADY_EXISTS",
            Self::RoleNotExists => "ROLE_NOT_EXISTS",
            Self::RoleAlreadyAssign => "ROLE_ALREADY_ASSIGN",
            Self::AccessRightAlreadyExists => "ACCESS_RIGHT_ALREADY_EXISTS",
            Self::AccessRightNotExists => "ACCESS_RIGHT_NOT_EXISTS",
            Self::AccessRightAlreadyAssign => "ACCESS_RIGHT_ALREADY_ASSIGN",
            Self::UserHasNoRole => "USER_HAS_NO_ROLE",
            Self::UserHasNoRight => "USER_HAS_NO_RIGHT",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::OAuthInvalidState => "OAUTH_INVALID_STATE",
            Self::OAuthNotAvailableEmail => "OAUTH_NOT_AVAILABLE_EMAIL",
            Self::OAuthUserAlreadyExists => "OAUTH_USER_ALREADY_EXISTS",
            Self::OAuthProviderNotFound(_) => "OAUTH_PROVIDER_NOT_FOUND",
            Self::OAuthProvider(_) => "OAUTH_PROVIDER_ERROR",
            Self::DestroyNotSupported
            | Self::LogoutNotSupported
            | Self::DuplicateBackendNames(_)
            | Self::PasswordHashingFailed
            | Self::Database(_)
            | Self::Cache(_)
            | Self::Config(_)
            | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Human-readable detail attached to the code, if any
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::InvalidPassword { reason } | Self::RegisterInvalidPassword { reason } => {
                Some(reason.clone())
            }
            _ => None,
        }
    }

    pub fn invalid_password(reason: impl Into<String>) -> Self {
        Self::InvalidPassword { reason: reason.into() }
    }

    /// Create a rate limit error with retry-after duration (rounded up)
    pub fn too_many_requests(retry_after: std::time::Duration) -> Self {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        Self::TooManyRequests { retry_after: secs.max(1) }
    }
}

/// Error body: `{"detail": "<CODE>"}` or `{"detail": {"code", "reason"}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Code(String),
    Reason { code: String, reason: String },
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        let code = error.error_code().to_string();
        let detail = match error.reason() {
            Some(reason) => ErrorDetail::Reason { code, reason },
            None => ErrorDetail::Code(code),
        };
        Self { detail }
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Redis(e) => Self::Cache(e),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        Self::InvalidToken
    }
}
