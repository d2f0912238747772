//! User handlers
//!
//! `/users/me` is self-service with privileged fields ignored; `/users/:id`
//! is superuser-only and may change anything.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;
use uuid::Uuid;

use gatehouse_auth::AuthError;
use gatehouse_db::{AccessRight, Role, SignInHistoryEvent, User, UserRole};

use crate::dto::{PageQuery, PageResponse, UserRead, UserRoleRequest, UserUpdateRequest};
use crate::error::ApiResult;
use crate::extractors::{AdminUser, CurrentUser, IdPath, SuperUser, ValidJson, ValidQuery};
use crate::state::AppState;

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserRead> {
    Json(user.into())
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<UserUpdateRequest>,
) -> ApiResult<Json<UserRead>> {
    let user = state.auth.users.update(&user, request.into(), true).await?;
    Ok(Json(user.into()))
}

/// Sign-in history, newest first
pub async fn my_history(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ValidQuery(query): ValidQuery<PageQuery>,
) -> ApiResult<Json<PageResponse<SignInHistoryEvent>>> {
    let pagination = query.pagination();
    let page = state.auth.users.history(&user, pagination).await?;
    Ok(Json(PageResponse::new(page, pagination)))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _caller: SuperUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<UserRead>> {
    Ok(Json(state.auth.users.get(id).await?.into()))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    SuperUser(caller): SuperUser,
    IdPath(id): IdPath,
    ValidJson(request): ValidJson<UserUpdateRequest>,
) -> ApiResult<Json<UserRead>> {
    let users = &state.auth.users;
    let user = users.get(id).await?;
    let user = users.update(&user, request.into(), false).await?;
    info!(user_id = %user.id, by = %caller.id, "User updated");
    Ok(Json(user.into()))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    SuperUser(caller): SuperUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    let users = &state.auth.users;
    let user = users.get(id).await?;
    users.delete(&user).await?;
    info!(user_id = %id, by = %caller.id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Users may read their own grants; admins and superusers anyone's
fn can_inspect(caller: &User, user_id: Uuid) -> Result<(), AuthError> {
    if caller.id == user_id || caller.is_admin || caller.is_superuser {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// `GET /users/:id/roles`, 204 when the user has none
pub async fn user_roles(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Vec<Role>>> {
    can_inspect(&caller, id)?;
    Ok(Json(state.auth.roles.get_user_roles(id).await?))
}

/// `GET /users/:id/rights`: union over the user's roles, 204 when empty
pub async fn user_rights(
    State(state): State<Arc<AppState>>,
    CurrentUser(caller): CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Vec<AccessRight>>> {
    can_inspect(&caller, id)?;
    Ok(Json(state.auth.rights.get_user_access_rights(id).await?))
}

/// `POST /users/roles`
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<UserRoleRequest>,
) -> ApiResult<(StatusCode, Json<UserRole>)> {
    let link = state
        .auth
        .roles
        .assign_user_role(request.user_id, request.role_id)
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// `DELETE /users/roles`, idempotent
pub async fn remove_role(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<UserRoleRequest>,
) -> ApiResult<StatusCode> {
    state
        .auth
        .roles
        .remove_user_role(request.user_id, request.role_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(is_admin: bool, is_superuser: bool) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: "u@example.com".into(),
            hashed_password: "h".into(),
            is_active: true,
            is_superuser,
            is_admin,
            is_verified: true,
            first_name: None,
            last_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_can_inspect() {
        let plain = user(false, false);
        assert!(can_inspect(&plain, plain.id).is_ok());
        assert!(matches!(can_inspect(&plain, Uuid::new_v4()), Err(AuthError::Forbidden)));
        assert!(can_inspect(&user(true, false), Uuid::new_v4()).is_ok());
        assert!(can_inspect(&user(false, true), Uuid::new_v4()).is_ok());
    }
}
