//! User repository

use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::{DbError, DbResult, NewUser, User, UserUpdate};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> DbResult<Option<User>>;

    /// Case-insensitive lookup
    async fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>>;

    /// Case-insensitive lookup
    async fn get_user_by_username(&self, username: &str) -> DbResult<Option<User>>;

    /// Fails with [`DbError::Duplicate`] when the e-mail or username is taken
    async fn create_user(&self, user: NewUser) -> DbResult<User>;

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> DbResult<User>;

    /// Removes the user with its role links, access tokens and OAuth accounts
    async fn delete_user(&self, id: Uuid) -> DbResult<()>;
}

const USER_COLUMNS: &str = r#"
    id, username, email, hashed_password, is_active, is_superuser, is_admin,
    is_verified, first_name, last_name, created_at, updated_at
"#;

#[async_trait]
impl UserRepository for PgStore {
    async fn get_user(&self, id: Uuid) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM identity.users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM identity.users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM identity.users WHERE lower(username) = lower($1)"
        ))
        .bind(username)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO identity.users
                (id, username, email, hashed_password, is_active, is_superuser,
                 is_admin, is_verified, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.is_admin)
        .bind(user.is_verified)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "users_email_key"))?;

        Ok(created)
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> DbResult<User> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE identity.users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                hashed_password = COALESCE($4, hashed_password),
                is_active = COALESCE($5, is_active),
                is_superuser = COALESCE($6, is_superuser),
                is_admin = COALESCE($7, is_admin),
                is_verified = COALESCE($8, is_verified),
                first_name = COALESCE($9, first_name),
                last_name = COALESCE($10, last_name),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.username)
        .bind(&update.email)
        .bind(&update.hashed_password)
        .bind(update.is_active)
        .bind(update.is_superuser)
        .bind(update.is_admin)
        .bind(update.is_verified)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "users_email_key"))?;

        updated.ok_or_else(|| DbError::NotFound(format!("user {}", id)))
    }

    async fn delete_user(&self, id: Uuid) -> DbResult<()> {
        // Foreign keys cascade to user_roles, access_tokens and oauth_accounts.
        let result = sqlx::query("DELETE FROM identity.users WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }
}
