//! Authentication DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use gatehouse_auth::UserCreate;

/// `application/x-www-form-urlencoded` login; `username` may be the e-mail
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, max = 150))]
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<RegisterRequest> for UserCreate {
    fn from(req: RegisterRequest) -> Self {
        let mut create = UserCreate::new(req.email, req.password);
        create.username = req.username;
        create.first_name = req.first_name;
        create.last_name = req.last_name;
        create
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub authorization_url: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}
