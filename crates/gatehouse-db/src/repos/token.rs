//! Access-token repository (database strategy)

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::PgStore;
use crate::{AccessTokenRecord, DbError, DbResult};

#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    async fn create_access_token(&self, record: AccessTokenRecord) -> DbResult<AccessTokenRecord>;

    /// Look up a token; with `max_age`, rows created earlier than
    /// `now - max_age` are treated as missing.
    async fn get_access_token(
        &self,
        token: &str,
        max_age: Option<Duration>,
    ) -> DbResult<Option<AccessTokenRecord>>;

    async fn delete_access_token(&self, token: &str) -> DbResult<()>;
}

#[async_trait]
impl AccessTokenRepository for PgStore {
    async fn create_access_token(&self, record: AccessTokenRecord) -> DbResult<AccessTokenRecord> {
        let created = sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            INSERT INTO identity.access_tokens (token, user_id, created_at)
            VALUES ($1, $2, $3)
            RETURNING token, user_id, created_at
            "#,
        )
        .bind(&record.token)
        .bind(record.user_id)
        .bind(record.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "access_tokens_pkey"))?;

        Ok(created)
    }

    async fn get_access_token(
        &self,
        token: &str,
        max_age: Option<Duration>,
    ) -> DbResult<Option<AccessTokenRecord>> {
        let not_before = max_age.map(|age| Utc::now() - age);

        let record = sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            SELECT token, user_id, created_at FROM identity.access_tokens
            WHERE token = $1 AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
            "#,
        )
        .bind(token)
        .bind(not_before)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }

    async fn delete_access_token(&self, token: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM identity.access_tokens WHERE token = $1")
            .bind(token)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
