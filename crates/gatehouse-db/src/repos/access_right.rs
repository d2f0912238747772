//! Access-right repository

use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::{AccessRight, DbError, DbResult, Page, Pagination, RoleAccessRight};

#[async_trait]
pub trait AccessRightRepository: Send + Sync {
    async fn create_access_right(&self, name: &str) -> DbResult<AccessRight>;

    async fn get_access_right(&self, id: Uuid) -> DbResult<Option<AccessRight>>;

    async fn get_access_right_by_name(&self, name: &str) -> DbResult<Option<AccessRight>>;

    async fn update_access_right(&self, id: Uuid, name: &str) -> DbResult<AccessRight>;

    async fn delete_access_right(&self, id: Uuid) -> DbResult<()>;

    async fn search_access_rights(
        &self,
        page: Pagination,
        name: Option<&str>,
    ) -> DbResult<Page<AccessRight>>;

    async fn get_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<Option<RoleAccessRight>>;

    /// Fails with [`DbError::Duplicate`] when the pair already exists
    async fn add_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<RoleAccessRight>;

    async fn remove_role_access_right(&self, role_id: Uuid, access_right_id: Uuid)
        -> DbResult<bool>;

    async fn list_role_access_rights(&self, role_id: Uuid) -> DbResult<Vec<AccessRight>>;

    /// Distinct union of the rights granted to any of `role_ids`
    async fn list_roles_access_rights(&self, role_ids: &[Uuid]) -> DbResult<Vec<AccessRight>>;
}

#[async_trait]
impl AccessRightRepository for PgStore {
    async fn create_access_right(&self, name: &str) -> DbResult<AccessRight> {
        let right = sqlx::query_as::<_, AccessRight>(
            r#"
            INSERT INTO identity.access_rights (id, name)
            VALUES ($1, $2)
            RETURNING id, name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "access_rights_name_key"))?;

        Ok(right)
    }

    async fn get_access_right(&self, id: Uuid) -> DbResult<Option<AccessRight>> {
        let right = sqlx::query_as::<_, AccessRight>(
            "SELECT id, name FROM identity.access_rights WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(right)
    }

    async fn get_access_right_by_name(&self, name: &str) -> DbResult<Option<AccessRight>> {
        let right = sqlx::query_as::<_, AccessRight>(
            "SELECT id, name FROM identity.access_rights WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;

        Ok(right)
    }

    async fn update_access_right(&self, id: Uuid, name: &str) -> DbResult<AccessRight> {
        let right = sqlx::query_as::<_, AccessRight>(
            "UPDATE identity.access_rights SET name = $2 WHERE id = $1 RETURNING id, name",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "access_rights_name_key"))?;

        right.ok_or_else(|| DbError::NotFound(format!("access right {}", id)))
    }

    async fn delete_access_right(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM identity.access_rights WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("access right {}", id)));
        }
        Ok(())
    }

    async fn search_access_rights(
        &self,
        page: Pagination,
        name: Option<&str>,
    ) -> DbResult<Page<AccessRight>> {
        let items = sqlx::query_as::<_, AccessRight>(
            r#"
            SELECT id, name FROM identity.access_rights
            WHERE ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%')
            ORDER BY name
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(name)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(self.pool())
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM identity.access_rights WHERE ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%')",
        )
        .bind(name)
        .fetch_one(self.pool())
        .await?;

        Ok(Page { items, total: total.max(0) as u64 })
    }

    async fn get_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<Option<RoleAccessRight>> {
        let link = sqlx::query_as::<_, RoleAccessRight>(
            r#"
            SELECT id, role_id, access_right_id FROM identity.role_access_rights
            WHERE role_id = $1 AND access_right_id = $2
            "#,
        )
        .bind(role_id)
        .bind(access_right_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(link)
    }

    async fn add_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<RoleAccessRight> {
        let link = sqlx::query_as::<_, RoleAccessRight>(
            r#"
            INSERT INTO identity.role_access_rights (id, role_id, access_right_id)
            VALUES ($1, $2, $3)
            RETURNING id, role_id, access_right_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(role_id)
        .bind(access_right_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "role_access_rights_role_id_access_right_id_key"))?;

        Ok(link)
    }

    async fn remove_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM identity.role_access_rights WHERE role_id = $1 AND access_right_id = $2",
        )
        .bind(role_id)
        .bind(access_right_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_role_access_rights(&self, role_id: Uuid) -> DbResult<Vec<AccessRight>> {
        let rights = sqlx::query_as::<_, AccessRight>(
            r#"
            SELECT a.id, a.name
            FROM identity.access_rights a
            JOIN identity.role_access_rights ra ON ra.access_right_id = a.id
            WHERE ra.role_id = $1
            ORDER BY a.name
            "#,
        )
        .bind(role_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rights)
    }

    async fn list_roles_access_rights(&self, role_ids: &[Uuid]) -> DbResult<Vec<AccessRight>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rights = sqlx::query_as::<_, AccessRight>(
            r#"
            SELECT DISTINCT a.id, a.name
            FROM identity.access_rights a
            JOIN identity.role_access_rights ra ON ra.access_right_id = a.id
            WHERE ra.role_id = ANY($1)
            "#,
        )
        .bind(role_ids)
        .fetch_all(self.pool())
        .await?;

        Ok(rights)
    }
}
