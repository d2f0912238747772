//! Role handlers (admin only)

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use gatehouse_db::{AccessRight, Role, RoleAccessRight};

use crate::dto::{NameRequest, PageQuery, PageResponse, RoleAccessRightRequest};
use crate::error::ApiResult;
use crate::extractors::{AdminUser, IdPath, ValidJson, ValidQuery};
use crate::state::AppState;

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidQuery(query): ValidQuery<PageQuery>,
) -> ApiResult<Json<PageResponse<Role>>> {
    let pagination = query.pagination();
    let page = state
        .auth
        .roles
        .search(pagination, query.name.as_deref())
        .await?;
    Ok(Json(PageResponse::new(page, pagination)))
}

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<NameRequest>,
) -> ApiResult<(StatusCode, Json<Role>)> {
    let role = state.auth.roles.create(&request.name).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Role>> {
    Ok(Json(state.auth.roles.get(id).await?))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    IdPath(id): IdPath,
    ValidJson(request): ValidJson<NameRequest>,
) -> ApiResult<Json<Role>> {
    Ok(Json(state.auth.roles.update(id, &request.name).await?))
}

pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    state.auth.roles.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /roles/:id/rights`
pub async fn role_rights(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Vec<AccessRight>>> {
    Ok(Json(state.auth.rights.get_role_access_rights(id).await?))
}

/// `POST /roles/rights`
pub async fn assign_right(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<RoleAccessRightRequest>,
) -> ApiResult<(StatusCode, Json<RoleAccessRight>)> {
    let link = state
        .auth
        .rights
        .assign_role_access_right(request.role_id, request.access_right_id)
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// `DELETE /roles/rights`, idempotent
pub async fn remove_right(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<RoleAccessRightRequest>,
) -> ApiResult<StatusCode> {
    state
        .auth
        .rights
        .remove_role_access_right(request.role_id, request.access_right_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
