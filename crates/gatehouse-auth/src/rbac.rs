//! Role-based access control: user → roles → access rights

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use gatehouse_db::{
    AccessRight, AccessRightRepository, CredentialStore, DbError, Page, Pagination, Role,
    RoleAccessRight, RoleRepository, UserRepository, UserRole,
};

use crate::error::{AuthError, AuthResult};

fn not_found_as(error: AuthError) -> impl FnOnce(DbError) -> AuthError {
    move |e| match e {
        DbError::NotFound(_) => error,
        other => other.into(),
    }
}

fn duplicate_as(error: AuthError) -> impl FnOnce(DbError) -> AuthError {
    move |e| match e {
        DbError::Duplicate(_) => error,
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct RoleManager {
    store: Arc<dyn CredentialStore>,
}

impl RoleManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, name: &str) -> AuthResult<Role> {
        if self.store.get_role_by_name(name).await?.is_some() {
            return Err(AuthError::RoleAlreadyExists);
        }
        let role = self
            .store
            .create_role(name)
            .await
            .map_err(duplicate_as(AuthError::RoleAlreadyExists))?;
        info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    pub async fn get(&self, id: Uuid) -> AuthResult<Role> {
        self.store.get_role(id).await?.ok_or(AuthError::RoleNotExists)
    }

    pub async fn update(&self, id: Uuid, name: &str) -> AuthResult<Role> {
        match self.store.update_role(id, name).await {
            Ok(role) => Ok(role),
            Err(DbError::NotFound(_)) => Err(AuthError::RoleNotExists),
            Err(DbError::Duplicate(_)) => Err(AuthError::RoleAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: Uuid) -> AuthResult<()> {
        self.store
            .delete_role(id)
            .await
            .map_err(not_found_as(AuthError::RoleNotExists))?;
        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    pub async fn search(&self, page: Pagination, name: Option<&str>) -> AuthResult<Page<Role>> {
        Ok(self.store.search_roles(page, name).await?)
    }

    pub async fn assign_user_role(&self, user_id: Uuid, role_id: Uuid) -> AuthResult<UserRole> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(AuthError::UserNotExists);
        }
        self.get(role_id).await?;
        if self.store.get_user_role(user_id, role_id).await?.is_some() {
            return Err(AuthError::RoleAlreadyAssign);
        }

        // A concurrent assignment loses on the unique (user_id, role_id) pair
        let link = self
            .store
            .add_user_role(user_id, role_id)
            .await
            .map_err(duplicate_as(AuthError::RoleAlreadyAssign))?;
        info!(user_id = %user_id, role_id = %role_id, "Role assigned");
        Ok(link)
    }

    /// Idempotent; returns whether a link was removed
    pub async fn remove_user_role(&self, user_id: Uuid, role_id: Uuid) -> AuthResult<bool> {
        Ok(self.store.remove_user_role(user_id, role_id).await?)
    }

    pub async fn get_user_roles(&self, user_id: Uuid) -> AuthResult<Vec<Role>> {
        let roles = self.store.list_user_roles(user_id).await?;
        if roles.is_empty() {
            return Err(AuthError::UserHasNoRole);
        }
        Ok(roles)
    }
}

#[derive(Clone)]
pub struct AccessRightManager {
    store: Arc<dyn CredentialStore>,
}

impl AccessRightManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, name: &str) -> AuthResult<AccessRight> {
        if self.store.get_access_right_by_name(name).await?.is_some() {
            return Err(AuthError::AccessRightAlreadyExists);
        }
        let right = self
            .store
            .create_access_right(name)
            .await
            .map_err(duplicate_as(AuthError::AccessRightAlreadyExists))?;
        info!(access_right_id = %right.id, name = %right.name, "Access right created");
        Ok(right)
    }

    pub async fn get(&self, id: Uuid) -> AuthResult<AccessRight> {
        self.store
            .get_access_right(id)
            .await?
            .ok_or(AuthError::AccessRightNotExists)
    }

    pub async fn update(&self, id: Uuid, name: &str) -> AuthResult<AccessRight> {
        match self.store.update_access_right(id, name).await {
            Ok(right) => Ok(right),
            Err(DbError::NotFound(_)) => Err(AuthError::AccessRightNotExists),
            Err(DbError::Duplicate(_)) => Err(AuthError::AccessRightAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: Uuid) -> AuthResult<()> {
        self.store
            .delete_access_right(id)
            .await
            .map_err(not_found_as(AuthError::AccessRightNotExists))?;
        info!(access_right_id = %id, "Access right deleted");
        Ok(())
    }

    pub async fn search(
        &self,
        page: Pagination,
        name: Option<&str>,
    ) -> AuthResult<Page<AccessRight>> {
        Ok(self.store.search_access_rights(page, name).await?)
    }

    pub async fn assign_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> AuthResult<RoleAccessRight> {
        if self.store.get_role(role_id).await?.is_none() {
            return Err(AuthError::RoleNotExists);
        }
        self.get(access_right_id).await?;
        if self.check_role_access_right(role_id, access_right_id).await? {
            return Err(AuthError::AccessRightAlreadyAssign);
        }

        let link = self
            .store
            .add_role_access_right(role_id, access_right_id)
            .await
            .map_err(duplicate_as(AuthError::AccessRightAlreadyAssign))?;
        info!(role_id = %role_id, access_right_id = %access_right_id, "Access right assigned");
        Ok(link)
    }

    /// Idempotent; returns whether a link was removed
    pub async fn remove_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> AuthResult<bool> {
        Ok(self
            .store
            .remove_role_access_right(role_id, access_right_id)
            .await?)
    }

    pub async fn check_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> AuthResult<bool> {
        Ok(self
            .store
            .get_role_access_right(role_id, access_right_id)
            .await?
            .is_some())
    }

    pub async fn get_role_access_rights(&self, role_id: Uuid) -> AuthResult<Vec<AccessRight>> {
        if self.store.get_role(role_id).await?.is_none() {
            return Err(AuthError::RoleNotExists);
        }
        Ok(self.store.list_role_access_rights(role_id).await?)
    }

    /// Union of the rights of several roles, deduplicated by id
    pub async fn get_roles_access_rights(&self, role_ids: &[Uuid]) -> AuthResult<Vec<AccessRight>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.list_roles_access_rights(role_ids).await?)
    }

    /// Every right granted to the user through any of their roles
    pub async fn get_user_access_rights(&self, user_id: Uuid) -> AuthResult<Vec<AccessRight>> {
        let role_ids: Vec<Uuid> = self
            .store
            .list_user_roles(user_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let rights = self.get_roles_access_rights(&role_ids).await?;
        if rights.is_empty() {
            return Err(AuthError::UserHasNoRight);
        }
        Ok(rights)
    }

    /// Ids for the `access_right_ids` token claim; empty when the user has none
    pub async fn access_right_ids(&self, user_id: Uuid) -> AuthResult<Vec<Uuid>> {
        match self.get_user_access_rights(user_id).await {
            Ok(rights) => Ok(rights.into_iter().map(|r| r.id).collect()),
            Err(AuthError::UserHasNoRight) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{MemoryStore, NewUser, User};
    use std::collections::HashSet;

    async fn setup() -> (RoleManager, AccessRightManager, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser::new("alice", "alice@example.com", "hash"))
            .await
            .unwrap();
        (
            RoleManager::new(store.clone()),
            AccessRightManager::new(store),
            user,
        )
    }

    #[tokio::test]
    async fn test_role_crud() {
        let (roles, _, _) = setup().await;
        let role = roles.create("editor").await.unwrap();
        assert!(matches!(roles.create("editor").await, Err(AuthError::RoleAlreadyExists)));

        let renamed = roles.update(role.id, "writer").await.unwrap();
        assert_eq!(renamed.name, "writer");
        assert_eq!(roles.get(role.id).await.unwrap().name, "writer");

        roles.delete(role.id).await.unwrap();
        assert!(matches!(roles.get(role.id).await, Err(AuthError::RoleNotExists)));
        assert!(matches!(roles.delete(role.id).await, Err(AuthError::RoleNotExists)));
        assert!(matches!(
            roles.update(role.id, "x").await,
            Err(AuthError::RoleNotExists)
        ));
    }

    #[tokio::test]
    async fn test_role_search_filters_by_name() {
        let (roles, _, _) = setup().await;
        for name in ["admin", "auditor", "editor"] {
            roles.create(name).await.unwrap();
        }
        let page = roles.search(Pagination::default(), Some("a")).await.unwrap();
        let names: HashSet<_> = page.items.into_iter().map(|r| r.name).collect();
        assert_eq!(names, HashSet::from(["admin".to_string(), "auditor".to_string()]));
    }

    #[tokio::test]
    async fn test_assign_user_role_once() {
        let (roles, _, user) = setup().await;
        let role = roles.create("editor").await.unwrap();

        assert!(matches!(roles.get_user_roles(user.id).await, Err(AuthError::UserHasNoRole)));
        roles.assign_user_role(user.id, role.id).await.unwrap();
        assert!(matches!(
            roles.assign_user_role(user.id, role.id).await,
            Err(AuthError::RoleAlreadyAssign)
        ));
        assert_eq!(roles.get_user_roles(user.id).await.unwrap(), vec![role.clone()]);

        assert!(roles.remove_user_role(user.id, role.id).await.unwrap());
        assert!(!roles.remove_user_role(user.id, role.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_assign_requires_existing_rows() {
        let (roles, rights, user) = setup().await;
        assert!(matches!(
            roles.assign_user_role(user.id, Uuid::new_v4()).await,
            Err(AuthError::RoleNotExists)
        ));
        let role = roles.create("editor").await.unwrap();
        assert!(matches!(
            roles.assign_user_role(Uuid::new_v4(), role.id).await,
            Err(AuthError::UserNotExists)
        ));
        assert!(matches!(
            rights.assign_role_access_right(role.id, Uuid::new_v4()).await,
            Err(AuthError::AccessRightNotExists)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_assignment_yields_one_link() {
        let (roles, _, user) = setup().await;
        let role = roles.create("editor").await.unwrap();

        let (a, b) = tokio::join!(
            roles.assign_user_role(user.id, role.id),
            roles.assign_user_role(user.id, role.id)
        );
        let ok = [a.is_ok(), b.is_ok()].iter().filter(|x| **x).count();
        assert_eq!(ok, 1);
        assert_eq!(roles.get_user_roles(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_rights_are_union_of_role_rights() {
        let (roles, rights, user) = setup().await;
        let editor = roles.create("editor").await.unwrap();
        let viewer = roles.create("viewer").await.unwrap();
        let read = rights.create("read").await.unwrap();
        let write = rights.create("write").await.unwrap();

        rights.assign_role_access_right(editor.id, read.id).await.unwrap();
        rights.assign_role_access_right(editor.id, write.id).await.unwrap();
        rights.assign_role_access_right(viewer.id, read.id).await.unwrap();
        assert!(matches!(
            rights.assign_role_access_right(viewer.id, read.id).await,
            Err(AuthError::AccessRightAlreadyAssign)
        ));
        assert!(rights.check_role_access_right(viewer.id, read.id).await.unwrap());
        assert!(!rights.check_role_access_right(viewer.id, write.id).await.unwrap());

        assert!(matches!(
            rights.get_user_access_rights(user.id).await,
            Err(AuthError::UserHasNoRight)
        ));
        assert!(rights.access_right_ids(user.id).await.unwrap().is_empty());

        roles.assign_user_role(user.id, editor.id).await.unwrap();
        roles.assign_user_role(user.id, viewer.id).await.unwrap();

        let ids: HashSet<Uuid> = rights.access_right_ids(user.id).await.unwrap().into_iter().collect();
        assert_eq!(ids, HashSet::from([read.id, write.id]));
        assert_eq!(rights.get_user_access_rights(user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_roles_access_rights_union_is_deduplicated() {
        let (roles, rights, _) = setup().await;
        let first = roles.create("first").await.unwrap();
        let second = roles.create("second").await.unwrap();
        let a = rights.create("a").await.unwrap();
        let b = rights.create("b").await.unwrap();
        let c = rights.create("c").await.unwrap();

        rights.assign_role_access_right(first.id, a.id).await.unwrap();
        rights.assign_role_access_right(first.id, b.id).await.unwrap();
        rights.assign_role_access_right(second.id, b.id).await.unwrap();
        rights.assign_role_access_right(second.id, c.id).await.unwrap();

        let union = rights
            .get_roles_access_rights(&[first.id, second.id])
            .await
            .unwrap();
        assert_eq!(union.len(), 3);
        let ids: HashSet<Uuid> = union.iter().map(|r| r.id).collect();
        assert_eq!(ids, HashSet::from([a.id, b.id, c.id]));

        assert!(rights.get_roles_access_rights(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_role_rights_for_unknown_role() {
        let (_, rights, _) = setup().await;
        assert!(matches!(
            rights.get_role_access_rights(Uuid::new_v4()).await,
            Err(AuthError::RoleNotExists)
        ));
        assert!(rights.get_roles_access_rights(&[]).await.unwrap().is_empty());
    }
}
