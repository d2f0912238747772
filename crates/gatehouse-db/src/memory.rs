//! In-process credential store
//!
//! All tables live behind one `RwLock`, so uniqueness checks and inserts
//! happen atomically with respect to other writers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    AccessRight, AccessRightRepository, AccessTokenRecord, AccessTokenRepository,
    CredentialStore, DbError, DbResult, NewOAuthAccount, NewUser, OAuthAccount,
    OAuthAccountRepository, Page, Pagination, Role, RoleAccessRight, RoleRepository,
    SignInHistoryEvent, SignInHistoryRepository, User, UserRepository, UserRole, UserUpdate,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    access_rights: HashMap<Uuid, AccessRight>,
    user_roles: Vec<UserRole>,
    role_access_rights: Vec<RoleAccessRight>,
    access_tokens: HashMap<String, AccessTokenRecord>,
    oauth_accounts: HashMap<Uuid, OAuthAccount>,
    sign_ins: Vec<SignInHistoryEvent>,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        let email = email.to_lowercase();
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.to_lowercase() == email)
    }

    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        let username = username.to_lowercase();
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.username.to_lowercase() == username)
    }
}

/// Credential store kept entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: Pagination) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Page { items, total }
}

fn name_matches(name: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(f) => name.to_lowercase().contains(&f.to_lowercase()),
        None => true,
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, id: Uuid) -> DbResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let email = email.to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let username = username.to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username.to_lowercase() == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(DbError::Duplicate("users_email_key".into()));
        }
        if tables.username_taken(&user.username, None) {
            return Err(DbError::Duplicate("users_username_key".into()));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            hashed_password: user.hashed_password,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_admin: user.is_admin,
            is_verified: user.is_verified,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &update.email {
            if tables.email_taken(email, Some(id)) {
                return Err(DbError::Duplicate("users_email_key".into()));
            }
        }
        if let Some(username) = &update.username {
            if tables.username_taken(username, Some(id)) {
                return Err(DbError::Duplicate("users_username_key".into()));
            }
        }

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("user {}", id)))?;
        update.apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Err(DbError::NotFound(format!("user {}", id)));
        }
        tables.user_roles.retain(|l| l.user_id != id);
        tables.access_tokens.retain(|_, t| t.user_id != id);
        tables.oauth_accounts.retain(|_, a| a.user_id != id);
        tables.sign_ins.retain(|e| e.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn create_role(&self, name: &str) -> DbResult<Role> {
        let mut tables = self.tables.write().await;
        if tables.roles.values().any(|r| r.name == name) {
            return Err(DbError::Duplicate("roles_name_key".into()));
        }
        let role = Role { id: Uuid::new_v4(), name: name.to_string() };
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> DbResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn get_role_by_name(&self, name: &str) -> DbResult<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.values().find(|r| r.name == name).cloned())
    }

    async fn update_role(&self, id: Uuid, name: &str) -> DbResult<Role> {
        let mut tables = self.tables.write().await;
        if tables.roles.values().any(|r| r.id != id && r.name == name) {
            return Err(DbError::Duplicate("roles_name_key".into()));
        }
        let role = tables
            .roles
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("role {}", id)))?;
        role.name = name.to_string();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: Uuid) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if tables.roles.remove(&id).is_none() {
            return Err(DbError::NotFound(format!("role {}", id)));
        }
        tables.user_roles.retain(|l| l.role_id != id);
        tables.role_access_rights.retain(|l| l.role_id != id);
        Ok(())
    }

    async fn search_roles(&self, page: Pagination, name: Option<&str>) -> DbResult<Page<Role>> {
        let tables = self.tables.read().await;
        let mut roles: Vec<Role> = tables
            .roles
            .values()
            .filter(|r| name_matches(&r.name, name))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(roles, page))
    }

    async fn get_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<Option<UserRole>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_roles
            .iter()
            .find(|l| l.user_id == user_id && l.role_id == role_id)
            .cloned())
    }

    async fn add_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<UserRole> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(DbError::InvalidInput(format!("unknown user {}", user_id)));
        }
        if !tables.roles.contains_key(&role_id) {
            return Err(DbError::InvalidInput(format!("unknown role {}", role_id)));
        }
        if tables
            .user_roles
            .iter()
            .any(|l| l.user_id == user_id && l.role_id == role_id)
        {
            return Err(DbError::Duplicate("user_roles_user_id_role_id_key".into()));
        }
        let link = UserRole { id: Uuid::new_v4(), user_id, role_id };
        tables.user_roles.push(link.clone());
        Ok(link)
    }

    async fn remove_user_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.user_roles.len();
        tables
            .user_roles
            .retain(|l| !(l.user_id == user_id && l.role_id == role_id));
        Ok(tables.user_roles.len() < before)
    }

    async fn list_user_roles(&self, user_id: Uuid) -> DbResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let mut roles: Vec<Role> = tables
            .user_roles
            .iter()
            .filter(|l| l.user_id == user_id)
            .filter_map(|l| tables.roles.get(&l.role_id).cloned())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}

#[async_trait]
impl AccessRightRepository for MemoryStore {
    async fn create_access_right(&self, name: &str) -> DbResult<AccessRight> {
        let mut tables = self.tables.write().await;
        if tables.access_rights.values().any(|r| r.name == name) {
            return Err(DbError::Duplicate("access_rights_name_key".into()));
        }
        let right = AccessRight { id: Uuid::new_v4(), name: name.to_string() };
        tables.access_rights.insert(right.id, right.clone());
        Ok(right)
    }

    async fn get_access_right(&self, id: Uuid) -> DbResult<Option<AccessRight>> {
        Ok(self.tables.read().await.access_rights.get(&id).cloned())
    }

    async fn get_access_right_by_name(&self, name: &str) -> DbResult<Option<AccessRight>> {
        let tables = self.tables.read().await;
        Ok(tables.access_rights.values().find(|r| r.name == name).cloned())
    }

    async fn update_access_right(&self, id: Uuid, name: &str) -> DbResult<AccessRight> {
        let mut tables = self.tables.write().await;
        if tables.access_rights.values().any(|r| r.id != id && r.name == name) {
            return Err(DbError::Duplicate("access_rights_name_key".into()));
        }
        let right = tables
            .access_rights
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("access right {}", id)))?;
        right.name = name.to_string();
        Ok(right.clone())
    }

    async fn delete_access_right(&self, id: Uuid) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if tables.access_rights.remove(&id).is_none() {
            return Err(DbError::NotFound(format!("access right {}", id)));
        }
        tables.role_access_rights.retain(|l| l.access_right_id != id);
        Ok(())
    }

    async fn search_access_rights(
        &self,
        page: Pagination,
        name: Option<&str>,
    ) -> DbResult<Page<AccessRight>> {
        let tables = self.tables.read().await;
        let mut rights: Vec<AccessRight> = tables
            .access_rights
            .values()
            .filter(|r| name_matches(&r.name, name))
            .cloned()
            .collect();
        rights.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(rights, page))
    }

    async fn get_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<Option<RoleAccessRight>> {
        let tables = self.tables.read().await;
        Ok(tables
            .role_access_rights
            .iter()
            .find(|l| l.role_id == role_id && l.access_right_id == access_right_id)
            .cloned())
    }

    async fn add_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<RoleAccessRight> {
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&role_id) {
            return Err(DbError::InvalidInput(format!("unknown role {}", role_id)));
        }
        if !tables.access_rights.contains_key(&access_right_id) {
            return Err(DbError::InvalidInput(format!(
                "unknown access right {}",
                access_right_id
            )));
        }
        if tables
            .role_access_rights
            .iter()
            .any(|l| l.role_id == role_id && l.access_right_id == access_right_id)
        {
            return Err(DbError::Duplicate(
                "role_access_rights_role_id_access_right_id_key".into(),
            ));
        }
        let link = RoleAccessRight { id: Uuid::new_v4(), role_id, access_right_id };
        tables.role_access_rights.push(link.clone());
        Ok(link)
    }

    async fn remove_role_access_right(
        &self,
        role_id: Uuid,
        access_right_id: Uuid,
    ) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.role_access_rights.len();
        tables
            .role_access_rights
            .retain(|l| !(l.role_id == role_id && l.access_right_id == access_right_id));
        Ok(tables.role_access_rights.len() < before)
    }

    async fn list_role_access_rights(&self, role_id: Uuid) -> DbResult<Vec<AccessRight>> {
        let tables = self.tables.read().await;
        let mut rights: Vec<AccessRight> = tables
            .role_access_rights
            .iter()
            .filter(|l| l.role_id == role_id)
            .filter_map(|l| tables.access_rights.get(&l.access_right_id).cloned())
            .collect();
        rights.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rights)
    }

    async fn list_roles_access_rights(&self, role_ids: &[Uuid]) -> DbResult<Vec<AccessRight>> {
        let tables = self.tables.read().await;
        let mut seen = HashMap::new();
        for link in tables
            .role_access_rights
            .iter()
            .filter(|l| role_ids.contains(&l.role_id))
        {
            if let Some(right) = tables.access_rights.get(&link.access_right_id) {
                seen.entry(right.id).or_insert_with(|| right.clone());
            }
        }
        Ok(seen.into_values().collect())
    }
}

#[async_trait]
impl AccessTokenRepository for MemoryStore {
    async fn create_access_token(&self, record: AccessTokenRecord) -> DbResult<AccessTokenRecord> {
        let mut tables = self.tables.write().await;
        if tables.access_tokens.contains_key(&record.token) {
            return Err(DbError::Duplicate("access_tokens_pkey".into()));
        }
        tables.access_tokens.insert(record.token.clone(), record.clone());
        Ok(record)
    }

    async fn get_access_token(
        &self,
        token: &str,
        max_age: Option<Duration>,
    ) -> DbResult<Option<AccessTokenRecord>> {
        let tables = self.tables.read().await;
        let not_before = max_age.map(|age| Utc::now() - age);
        Ok(tables
            .access_tokens
            .get(token)
            .filter(|r| not_before.map_or(true, |nb| r.created_at >= nb))
            .cloned())
    }

    async fn delete_access_token(&self, token: &str) -> DbResult<()> {
        self.tables.write().await.access_tokens.remove(token);
        Ok(())
    }
}

#[async_trait]
impl OAuthAccountRepository for MemoryStore {
    async fn get_user_by_oauth_account(
        &self,
        oauth_name: &str,
        account_id: &str,
    ) -> DbResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .oauth_accounts
            .values()
            .find(|a| a.oauth_name == oauth_name && a.account_id == account_id)
            .and_then(|a| tables.users.get(&a.user_id).cloned()))
    }

    async fn add_oauth_account(
        &self,
        user_id: Uuid,
        account: NewOAuthAccount,
    ) -> DbResult<OAuthAccount> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(DbError::InvalidInput(format!("unknown user {}", user_id)));
        }
        if tables
            .oauth_accounts
            .values()
            .any(|a| a.oauth_name == account.oauth_name && a.account_id == account.account_id)
        {
            return Err(DbError::Duplicate(
                "oauth_accounts_oauth_name_account_id_key".into(),
            ));
        }
        let created = OAuthAccount {
            id: Uuid::new_v4(),
            user_id,
            oauth_name: account.oauth_name,
            access_token: account.access_token,
            expires_at: account.expires_at,
            refresh_token: account.refresh_token,
            account_id: account.account_id,
            account_email: account.account_email,
        };
        tables.oauth_accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_oauth_account(
        &self,
        id: Uuid,
        account: NewOAuthAccount,
    ) -> DbResult<OAuthAccount> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .oauth_accounts
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("oauth account {}", id)))?;
        existing.access_token = account.access_token;
        existing.expires_at = account.expires_at;
        existing.refresh_token = account.refresh_token;
        existing.account_email = account.account_email;
        Ok(existing.clone())
    }

    async fn list_oauth_accounts(&self, user_id: Uuid) -> DbResult<Vec<OAuthAccount>> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<OAuthAccount> = tables
            .oauth_accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.oauth_name.cmp(&b.oauth_name));
        Ok(accounts)
    }
}

#[async_trait]
impl SignInHistoryRepository for MemoryStore {
    async fn record_sign_in(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> DbResult<SignInHistoryEvent> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(DbError::NotFound(format!("user {}", user_id)));
        }
        let event = SignInHistoryEvent {
            id: Uuid::new_v4(),
            user_id,
            timestamp: Utc::now(),
            fingerprint: fingerprint.to_string(),
        };
        tables.sign_ins.push(event.clone());
        Ok(event)
    }

    async fn list_sign_ins(
        &self,
        user_id: Uuid,
        page: Pagination,
    ) -> DbResult<Page<SignInHistoryEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<SignInHistoryEvent> = tables
            .sign_ins
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(paginate(events, page))
    }

    async fn ensure_sign_in_partitions(&self, _year: i32) -> DbResult<()> {
        Ok(())
    }

    async fn prune_sign_ins_before(&self, year: i32) -> DbResult<u64> {
        let mut tables = self.tables.write().await;
        let mut years: Vec<i32> = tables
            .sign_ins
            .iter()
            .map(|e| e.timestamp.year())
            .filter(|y| *y < year)
            .collect();
        years.sort_unstable();
        years.dedup();
        tables.sign_ins.retain(|e| e.timestamp.year() >= year);
        Ok(years.len() as u64)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}
