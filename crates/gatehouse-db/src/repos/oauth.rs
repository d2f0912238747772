//! OAuth account repository

use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::{DbError, DbResult, NewOAuthAccount, OAuthAccount, User};

#[async_trait]
pub trait OAuthAccountRepository: Send + Sync {
    async fn get_user_by_oauth_account(
        &self,
        oauth_name: &str,
        account_id: &str,
    ) -> DbResult<Option<User>>;

    /// Fails with [`DbError::Duplicate`] when the provider account is already linked
    async fn add_oauth_account(
        &self,
        user_id: Uuid,
        account: NewOAuthAccount,
    ) -> DbResult<OAuthAccount>;

    /// Refresh the stored tokens of an existing link
    async fn update_oauth_account(
        &self,
        id: Uuid,
        account: NewOAuthAccount,
    ) -> DbResult<OAuthAccount>;

    async fn list_oauth_accounts(&self, user_id: Uuid) -> DbResult<Vec<OAuthAccount>>;
}

const OAUTH_COLUMNS: &str = r#"
    id, user_id, oauth_name, access_token, expires_at, refresh_token,
    account_id, account_email
"#;

#[async_trait]
impl OAuthAccountRepository for PgStore {
    async fn get_user_by_oauth_account(
        &self,
        oauth_name: &str,
        account_id: &str,
    ) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.hashed_password, u.is_active,
                   u.is_superuser, u.is_admin, u.is_verified, u.first_name,
                   u.last_name, u.created_at, u.updated_at
            FROM identity.users u
            JOIN identity.oauth_accounts o ON o.user_id = u.id
            WHERE o.oauth_name = $1 AND o.account_id = $2
            "#,
        )
        .bind(oauth_name)
        .bind(account_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    async fn add_oauth_account(
        &self,
        user_id: Uuid,
        account: NewOAuthAccount,
    ) -> DbResult<OAuthAccount> {
        let created = sqlx::query_as::<_, OAuthAccount>(&format!(
            r#"
            INSERT INTO identity.oauth_accounts
                (id, user_id, oauth_name, access_token, expires_at, refresh_token,
                 account_id, account_email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {OAUTH_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&account.oauth_name)
        .bind(&account.access_token)
        .bind(account.expires_at)
        .bind(&account.refresh_token)
        .bind(&account.account_id)
        .bind(&account.account_email)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "oauth_accounts_oauth_name_account_id_key"))?;

        Ok(created)
    }

    async fn update_oauth_account(
        &self,
        id: Uuid,
        account: NewOAuthAccount,
    ) -> DbResult<OAuthAccount> {
        let updated = sqlx::query_as::<_, OAuthAccount>(&format!(
            r#"
            UPDATE identity.oauth_accounts SET
                access_token = $2,
                expires_at = $3,
                refresh_token = $4,
                account_email = $5
            WHERE id = $1
            RETURNING {OAUTH_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&account.access_token)
        .bind(account.expires_at)
        .bind(&account.refresh_token)
        .bind(&account.account_email)
        .fetch_optional(self.pool())
        .await?;

        updated.ok_or_else(|| DbError::NotFound(format!("oauth account {}", id)))
    }

    async fn list_oauth_accounts(&self, user_id: Uuid) -> DbResult<Vec<OAuthAccount>> {
        let accounts = sqlx::query_as::<_, OAuthAccount>(&format!(
            "SELECT {OAUTH_COLUMNS} FROM identity.oauth_accounts WHERE user_id = $1 ORDER BY oauth_name"
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(accounts)
    }
}
