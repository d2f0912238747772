//! Access right handlers (admin only)

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use gatehouse_db::AccessRight;

use crate::dto::{NameRequest, PageQuery, PageResponse};
use crate::error::ApiResult;
use crate::extractors::{AdminUser, IdPath, ValidJson, ValidQuery};
use crate::state::AppState;

pub async fn list_rights(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidQuery(query): ValidQuery<PageQuery>,
) -> ApiResult<Json<PageResponse<AccessRight>>> {
    let pagination = query.pagination();
    let page = state
        .auth
        .rights
        .search(pagination, query.name.as_deref())
        .await?;
    Ok(Json(PageResponse::new(page, pagination)))
}

pub async fn create_right(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<NameRequest>,
) -> ApiResult<(StatusCode, Json<AccessRight>)> {
    let right = state.auth.rights.create(&request.name).await?;
    Ok((StatusCode::CREATED, Json(right)))
}

pub async fn get_right(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<AccessRight>> {
    Ok(Json(state.auth.rights.get(id).await?))
}

pub async fn update_right(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    IdPath(id): IdPath,
    ValidJson(request): ValidJson<NameRequest>,
) -> ApiResult<Json<AccessRight>> {
    Ok(Json(state.auth.rights.update(id, &request.name).await?))
}

pub async fn delete_right(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    state.auth.rights.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
