//! Item API handlers

use crate::audit::AuditContext;
use crate::auth::{CurrentUser, MessageResponse};
use crate::error::AppError;
use crate::items::{CreateItemRequest, ItemAckResponse, ItemResponse, UpdateItemRequest};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use stash_core::ItemId;
use std::sync::Arc;

/// A path segment that is not a positive integer names no item
fn parse_item_id(raw: &str) -> Result<ItemId, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound("Item".to_string()))
}

/// List the caller's items
#[utoipa::path(
    get,
    path = "/items/",
    tag = "items",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Items owned by the caller", body = [ItemResponse]),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    )
)]
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let items = state.items.list(user.id).await?;
    Ok(Json(items))
}

/// Create an item owned by the caller
#[utoipa::path(
    post,
    path = "/items/",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreateItemRequest,
    responses(
        (status = 201, description = "Item created", body = ItemAckResponse),
        (status = 400, description = "Name is required", body = crate::error::ApiError),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    )
)]
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    body: Option<Json<CreateItemRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let response = state.items.create(user.id, request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Get one of the caller's items
#[utoipa::path(
    get,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "The item", body = ItemResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Item belongs to another user", body = crate::error::ApiError),
        (status = 404, description = "Item not found", body = crate::error::ApiError),
    )
)]
pub async fn get_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_item_id(&id)?;
    let ctx = AuditContext::from_headers(&headers);

    let item = state.items.get(user.id, id, &ctx).await?;

    Ok(Json(item))
}

/// Update one of the caller's items
#[utoipa::path(
    put,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Item id")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item updated", body = ItemAckResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Item belongs to another user", body = crate::error::ApiError),
        (status = 404, description = "Item not found", body = crate::error::ApiError),
    )
)]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<UpdateItemRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_item_id(&id)?;
    let ctx = AuditContext::from_headers(&headers);
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let response = state.items.update(user.id, id, request, &ctx).await?;

    Ok(Json(response))
}

/// Delete one of the caller's items
#[utoipa::path(
    delete,
    path = "/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item deleted", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Item belongs to another user", body = crate::error::ApiError),
        (status = 404, description = "Item not found", body = crate::error::ApiError),
    )
)]
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_item_id(&id)?;
    let ctx = AuditContext::from_headers(&headers);

    let response = state.items.delete(user.id, id, &ctx).await?;

    Ok(Json(response))
}
