//! Role repository

use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::{DbError, DbResult, Page, Pagination, Role, UserRole};

#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Fails with [`DbError::Duplicate`] when the name is taken
    async fn create_role(&self, name: &str) -> DbResult<Role>;

    async fn get_role(&self, id: Uuid) -> DbResult<Option<Role>>;

    async fn get_role_by_name(&self, name: &str) -> DbResult<Option<Role>>;

    async fn update_role(&self, id: Uuid, name: &str) -> DbResult<Role>;

    /// Removes the role together with its user and access-right links
    async fn delete_role(&self, id: Uuid) -> DbResult<()>;

    /// Roles ordered by name, optionally filtered by a case-insensitive substring
    async fn search_roles(&self, page: Pagination, name: Option<&str>) -> DbResult<Page<Role>>;

    async fn get_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<Option<UserRole>>;

    /// Fails with [`DbError::Duplicate`] when the pair already exists
    async fn add_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<UserRole>;

    /// Returns whether a link was removed
    async fn remove_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<bool>;

    async fn list_user_roles(&self, user_id: Uuid) -> DbResult<Vec<Role>>;
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn create_role(&self, name: &str) -> DbResult<Role> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO identity.roles (id, name)
            VALUES ($1, $2)
            RETURNING id, name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "roles_name_key"))?;

        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> DbResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT id, name FROM identity.roles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(role)
    }

    async fn get_role_by_name(&self, name: &str) -> DbResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT id, name FROM identity.roles WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?;

        Ok(role)
    }

    async fn update_role(&self, id: Uuid, name: &str) -> DbResult<Role> {
        let role = sqlx::query_as::<_, Role>(
            "UPDATE identity.roles SET name = $2 WHERE id = $1 RETURNING id, name",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "roles_name_key"))?;

        role.ok_or_else(|| DbError::NotFound(format!("role {}", id)))
    }

    async fn delete_role(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM identity.roles WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("role {}", id)));
        }
        Ok(())
    }

    async fn search_roles(&self, page: Pagination, name: Option<&str>) -> DbResult<Page<Role>> {
        let items = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name FROM identity.roles
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
            "SELECT COUNT(*) FROM identity.roles WHERE ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%')",
        )
        .bind(name)
        .fetch_one(self.pool())
        .await?;

        Ok(Page { items, total: total.max(0) as u64 })
    }

    async fn get_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<Option<UserRole>> {
        let link = sqlx::query_as::<_, UserRole>(
            "SELECT id, user_id, role_id FROM identity.user_roles WHERE user_id = $1 AND role_id = $2",
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(link)
    }

    async fn add_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<UserRole> {
        let link = sqlx::query_as::<_, UserRole>(
            r#"
            INSERT INTO identity.user_roles (id, user_id, role_id)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, role_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_write(e, "user_roles_user_id_role_id_key"))?;

        Ok(link)
    }

    async fn remove_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<bool> {
        let result =
            sqlx::query("DELETE FROM identity.user_roles WHERE user_id = $1 AND role_id = $2")
                .bind(user_id)
                .bind(role_id)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_user_roles(&self, user_id: Uuid) -> DbResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name
            FROM identity.roles r
            JOIN identity.user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(roles)
    }
}
