//! API error handling
//!
//! Every failure leaves as `{"detail": "<CODE>"}` or
//! `{"detail": {"code": "<CODE>", "reason": "..."}}`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{debug, error};

use gatehouse_auth::{AuthError, ErrorDetail, ErrorResponse};
use gatehouse_db::DbError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Body, form or query that does not deserialize or validate
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Malformed identifier in the path
    #[error("Invalid id: {0}")]
    InvalidId(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Validation(_) | Self::InvalidId(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        match self {
            Self::Auth(e) => ErrorResponse::from(e),
            Self::Validation(reason) => ErrorResponse {
                detail: ErrorDetail::Reason {
                    code: "VALIDATION_ERROR".into(),
                    reason: reason.clone(),
                },
            },
            Self::InvalidId(reason) => ErrorResponse {
                detail: ErrorDetail::Reason {
                    code: "INVALID_ID".into(),
                    reason: reason.clone(),
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        // Empty collections are reported without a body
        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }

        let mut response = (status, Json(self.body())).into_response();
        if let Self::Auth(AuthError::TooManyRequests { retry_after }) = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self::Auth(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_code_envelope() {
        let response = ApiError::from(AuthError::LoginBadCredentials).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"detail": "LOGIN_BAD_CREDENTIALS"})
        );
    }

    #[tokio::test]
    async fn test_reason_envelope() {
        let response = ApiError::from(AuthError::invalid_password("too short")).into_response();
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"detail": {"code": "INVALID_PASSWORD", "reason": "too short"}})
        );

        let response = ApiError::from(AuthError::RegisterInvalidPassword {
            reason: "too short".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"detail": {"code": "REGISTER_INVALID_PASSWORD", "reason": "too short"}})
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = ApiError::from(AuthError::Database("password=hunter2".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, serde_json::json!({"detail": "INTERNAL_ERROR"}));
    }

    #[test]
    fn test_retry_after_header() {
        let response = ApiError::from(AuthError::TooManyRequests { retry_after: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn test_empty_collections_have_no_body() {
        let response = ApiError::from(AuthError::UserHasNoRole).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_validation_is_unprocessable() {
        let response = ApiError::Validation("missing field `email`".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
