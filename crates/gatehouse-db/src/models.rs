//! Identity rows - mapped from the `identity` schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        hashed_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            hashed_password: hashed_password.into(),
            is_active: true,
            is_superuser: false,
            is_admin: false,
            is_verified: false,
            first_name: None,
            last_name: None,
        }
    }
}

/// Partial user update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_verified: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.hashed_password.is_none()
            && self.is_active.is_none()
            && self.is_superuser.is_none()
            && self.is_admin.is_none()
            && self.is_verified.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
    }

    /// Apply the update onto an in-memory row
    pub fn apply(&self, user: &mut User) {
        if let Some(v) = &self.username {
            user.username = v.clone();
        }
        if let Some(v) = &self.email {
            user.email = v.clone();
        }
        if let Some(v) = &self.hashed_password {
            user.hashed_password = v.clone();
        }
        if let Some(v) = self.is_active {
            user.is_active = v;
        }
        if let Some(v) = self.is_superuser {
            user.is_superuser = v;
        }
        if let Some(v) = self.is_admin {
            user.is_admin = v;
        }
        if let Some(v) = self.is_verified {
            user.is_verified = v;
        }
        if let Some(v) = &self.first_name {
            user.first_name = Some(v.clone());
        }
        if let Some(v) = &self.last_name {
            user.last_name = Some(v.clone());
        }
    }
}

// ============================================================================
// RBAC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow, Serialize, Deserialize)]
pub struct AccessRight {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleAccessRight {
    pub id: Uuid,
    pub role_id: Uuid,
    pub access_right_id: Uuid,
}

// ============================================================================
// Sessions & history
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SignInHistoryEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
}

// ============================================================================
// OAuth
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OAuthAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub oauth_name: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub expires_at: Option<i64>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub account_id: String,
    pub account_email: String,
}

/// OAuth account payload returned by a provider callback
#[derive(Debug, Clone)]
pub struct NewOAuthAccount {
    pub oauth_name: String,
    pub access_token: String,
    pub expires_at: Option<i64>,
    pub refresh_token: Option<String>,
    pub account_id: String,
    pub account_email: String,
}

// ============================================================================
// Paging
// ============================================================================

/// 1-based page selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::new(1, 20).offset(), 0);
        assert_eq!(Pagination::new(3, 20).offset(), 40);
        assert_eq!(Pagination::new(0, 0), Pagination { page: 1, limit: 1 });
    }

    #[test]
    fn test_user_update_apply() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            hashed_password: "x".into(),
            is_active: true,
            is_superuser: false,
            is_admin: false,
            is_verified: false,
            first_name: None,
            last_name: None,
            created_at: now,
            updated_at: now,
        };
        let update = UserUpdate {
            is_verified: Some(true),
            first_name: Some("Alice".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut user);
        assert!(user.is_verified);
        assert_eq!(user.first_name.as_deref(), Some("Alice"));
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_user_hash_not_serialized() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: "bob".into(),
            email: "bob@example.com".into(),
            hashed_password: "secret-hash".into(),
            is_active: true,
            is_superuser: false,
            is_admin: false,
            is_verified: true,
            first_name: None,
            last_name: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
