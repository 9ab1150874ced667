//! User administration handlers. Every route requires a global admin.
use crate::api::error::ApiError;
use crate::api::types::{CreateUserRequest, UpdateUserRequest, UserListResponse};
use crate::app::AppState;
use crate::auth::require_principal;
use crate::model::User;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = UserListResponse),
        (status = 403, description = "Caller is not an admin", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserListResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let items = state.services.list_users(&principal).await?;
    Ok(Json(UserListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input or username taken", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let user = state.services.create_user(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_user(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(state.services.get_user(&principal, user_id).await?))
}

#[utoipa::path(
    patch,
    path = "/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    request_body = UpdateUserRequest,
    responses((status = 200, description = "User updated", body = User))
)]
pub(crate) async fn update_user(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state.services.update_user(&principal, user_id, body).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/users/{user_id}",
    tag = "users",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses((status = 204, description = "User deactivated"))
)]
pub(crate) async fn deactivate_user(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state.services.deactivate_user(&principal, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
