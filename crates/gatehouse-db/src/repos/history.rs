//! Sign-in history repository
//!
//! `identity.signin_history` is range-partitioned by year. Partitions are
//! created ahead of time (at startup and on each maintenance tick) and
//! pruned by dropping whole years.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::PgStore;
use crate::{DbResult, Page, Pagination, SignInHistoryEvent};

#[async_trait]
pub trait SignInHistoryRepository: Send + Sync {
    async fn record_sign_in(&self, user_id: Uuid, fingerprint: &str)
        -> DbResult<SignInHistoryEvent>;

    /// Newest first
    async fn list_sign_ins(
        &self,
        user_id: Uuid,
        page: Pagination,
    ) -> DbResult<Page<SignInHistoryEvent>>;

    /// Make sure events of `year` and the following year can be stored
    async fn ensure_sign_in_partitions(&self, year: i32) -> DbResult<()>;

    /// Drop every event recorded before January 1st of `year`.
    /// Returns the number of yearly partitions removed.
    async fn prune_sign_ins_before(&self, year: i32) -> DbResult<u64>;
}

fn partition_name(year: i32) -> String {
    format!("signin_history_y{}", year)
}

impl PgStore {
    /// Create the partition holding `year` if it does not exist yet
    async fn create_sign_in_partition(&self, year: i32) -> DbResult<()> {
        // DDL cannot take bind parameters; `year` is an integer so the
        // formatted statement is safe.
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS identity.{} PARTITION OF identity.signin_history \
             FOR VALUES FROM ('{}-01-01') TO ('{}-01-01')",
            partition_name(year),
            year,
            year + 1
        );
        match sqlx::query(&ddl).execute(self.pool()).await {
            Ok(_) => Ok(()),
            // Another process created it between the existence check and ours
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SignInHistoryRepository for PgStore {
    async fn record_sign_in(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> DbResult<SignInHistoryEvent> {
        let now = Utc::now();
        let event = sqlx::query_as::<_, SignInHistoryEvent>(
            r#"
            INSERT INTO identity.signin_history (id, user_id, timestamp, fingerprint)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, timestamp, fingerprint
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(now)
        .bind(fingerprint)
        .fetch_one(self.pool())
        .await?;

        Ok(event)
    }

    async fn list_sign_ins(
        &self,
        user_id: Uuid,
        page: Pagination,
    ) -> DbResult<Page<SignInHistoryEvent>> {
        let items = sqlx::query_as::<_, SignInHistoryEvent>(
            r#"
            SELECT id, user_id, timestamp, fingerprint
            FROM identity.signin_history
            WHERE user_id = $1
            ORDER BY timestamp DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(self.pool())
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM identity.signin_history WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;

        Ok(Page { items, total: total.max(0) as u64 })
    }

    async fn ensure_sign_in_partitions(&self, year: i32) -> DbResult<()> {
        self.create_sign_in_partition(year).await?;
        self.create_sign_in_partition(year + 1).await
    }

    async fn prune_sign_ins_before(&self, year: i32) -> DbResult<u64> {
        let partitions: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT c.relname::TEXT
            FROM pg_inherits i
            JOIN pg_class c ON c.oid = i.inhrelid
            JOIN pg_class p ON p.oid = i.inhparent
            JOIN pg_namespace n ON n.oid = p.relnamespace
            WHERE n.nspname = 'identity' AND p.relname = 'signin_history'
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        let mut dropped = 0;
        for name in partitions {
            let Some(partition_year) = name
                .strip_prefix("signin_history_y")
                .and_then(|y| y.parse::<i32>().ok())
            else {
                continue;
            };
            if partition_year < year {
                sqlx::query(&format!("DROP TABLE IF EXISTS identity.{}", name))
                    .execute(self.pool())
                    .await?;
                info!(partition = %name, "Dropped sign-in history partition");
                dropped += 1;
            }
        }

        Ok(dropped)
    }
}
