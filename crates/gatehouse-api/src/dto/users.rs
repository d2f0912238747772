//! User DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use gatehouse_auth::UserPatch;
use gatehouse_db::User;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRead {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserRead {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_admin: user.is_admin,
            is_verified: user.is_verified,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: user.created_at,
        }
    }
}

/// Privileged fields are ignored on `/users/me`
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserUpdateRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 150))]
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_verified: Option<bool>,
}

impl From<UserUpdateRequest> for UserPatch {
    fn from(req: UserUpdateRequest) -> Self {
        Self {
            email: req.email,
            username: req.username,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            is_active: req.is_active,
            is_superuser: req.is_superuser,
            is_admin: req.is_admin,
            is_verified: req.is_verified,
        }
    }
}
