//! Scope handlers.
use crate::api::error::ApiError;
use crate::api::types::{CreateScopeRequest, ScopeListResponse, UpdateScopeRequest};
use crate::app::AppState;
use crate::auth::require_principal;
use crate::model::Scope;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/scopes",
    tag = "scopes",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses((status = 200, description = "Scopes in display order", body = ScopeListResponse))
)]
pub(crate) async fn list_scopes(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ScopeListResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let items = state.services.list_scopes(&principal, project_id).await?;
    Ok(Json(ScopeListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/scopes",
    tag = "scopes",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    request_body = CreateScopeRequest,
    responses(
        (status = 201, description = "Scope created", body = Scope),
        (status = 400, description = "Alias already used in the project", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_scope(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateScopeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let scope = state
        .services
        .create_scope(&principal, project_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(scope)))
}

#[utoipa::path(
    patch,
    path = "/v1/projects/{project_id}/scopes/{scope_id}",
    tag = "scopes",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("scope_id" = Uuid, Path, description = "Scope identifier")
    ),
    request_body = UpdateScopeRequest,
    responses((status = 200, description = "Scope updated", body = Scope))
)]
pub(crate) async fn update_scope(
    Path((project_id, scope_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateScopeRequest>,
) -> Result<Json<Scope>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .update_scope(&principal, project_id, scope_id, body)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}/scopes/{scope_id}",
    tag = "scopes",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("scope_id" = Uuid, Path, description = "Scope identifier")
    ),
    responses((status = 204, description = "Scope, its values and grants removed"))
)]
pub(crate) async fn delete_scope(
    Path((project_id, scope_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state
        .services
        .delete_scope(&principal, project_id, scope_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
