//! Flag and flag value handlers.
use crate::api::error::ApiError;
use crate::api::types::{
    CreateFlagRequest, FlagListResponse, FlagResponse, UpdateFlagRequest, UpdateFlagValueRequest,
};
use crate::app::AppState;
use crate::auth::require_principal;
use crate::model::FlagValue;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/flags",
    tag = "flags",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses((status = 200, description = "Flags with per-scope values", body = FlagListResponse))
)]
pub(crate) async fn list_flags(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FlagListResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let items = state.services.list_flags(&principal, project_id).await?;
    Ok(Json(FlagListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/flags",
    tag = "flags",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    request_body = CreateFlagRequest,
    responses(
        (status = 201, description = "Flag created, disabled in every scope", body = FlagResponse),
        (status = 400, description = "Key or name already used", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_flag(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateFlagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let flag = state
        .services
        .create_flag(&principal, project_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(flag)))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/flags/{flag_id}",
    tag = "flags",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("flag_id" = Uuid, Path, description = "Flag identifier")
    ),
    responses((status = 200, description = "Flag with values", body = FlagResponse))
)]
pub(crate) async fn get_flag(
    Path((project_id, flag_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FlagResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .get_flag(&principal, project_id, flag_id)
            .await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/v1/projects/{project_id}/flags/{flag_id}",
    tag = "flags",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("flag_id" = Uuid, Path, description = "Flag identifier")
    ),
    request_body = UpdateFlagRequest,
    responses((status = 200, description = "Flag updated", body = FlagResponse))
)]
pub(crate) async fn update_flag(
    Path((project_id, flag_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateFlagRequest>,
) -> Result<Json<FlagResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .update_flag(&principal, project_id, flag_id, body)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}/flags/{flag_id}",
    tag = "flags",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("flag_id" = Uuid, Path, description = "Flag identifier")
    ),
    responses((status = 204, description = "Flag deleted"))
)]
pub(crate) async fn delete_flag(
    Path((project_id, flag_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state
        .services
        .delete_flag(&principal, project_id, flag_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/projects/{project_id}/flags/{flag_id}/values/{scope_id}",
    tag = "flags",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("flag_id" = Uuid, Path, description = "Flag identifier"),
        ("scope_id" = Uuid, Path, description = "Scope identifier")
    ),
    request_body = UpdateFlagValueRequest,
    responses(
        (status = 200, description = "Value stored", body = FlagValue),
        (status = 403, description = "No update grant on the scope", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_flag_value(
    Path((project_id, flag_id, scope_id)): Path<(Uuid, Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateFlagValueRequest>,
) -> Result<Json<FlagValue>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .update_flag_value(&principal, project_id, flag_id, scope_id, body.enabled)
            .await?,
    ))
}
