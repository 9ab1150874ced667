//! Project handlers.
use crate::api::error::ApiError;
use crate::api::types::{
    ApiKeyResponse, CreateProjectRequest, ListProjectsQuery, PermissionsResponse,
    ProjectDetailResponse, ProjectListResponse, ProjectResponse, UpdateProjectRequest,
};
use crate::app::AppState;
use crate::auth::require_principal;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/projects",
    tag = "projects",
    params(ListProjectsQuery),
    responses(
        (status = 200, description = "Projects visible to the caller", body = ProjectListResponse)
    )
)]
pub(crate) async fn list_projects(
    Query(query): Query<ListProjectsQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProjectListResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let items = state
        .services
        .list_projects(&principal, query.include_archived)
        .await?;
    Ok(Json(ProjectListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/projects",
    tag = "projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created with default scopes", body = ProjectDetailResponse),
        (status = 400, description = "Invalid input or alias taken", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let project = state.services.create_project(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}",
    tag = "projects",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses(
        (status = 200, description = "Project with scopes", body = ProjectDetailResponse),
        (status = 403, description = "Caller is not a member", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_project(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProjectDetailResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state.services.get_project(&principal, project_id).await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/v1/projects/{project_id}",
    tag = "projects",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    request_body = UpdateProjectRequest,
    responses((status = 200, description = "Project updated", body = ProjectResponse))
)]
pub(crate) async fn update_project(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .update_project(&principal, project_id, body)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}",
    tag = "projects",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses((status = 204, description = "Project deleted"))
)]
pub(crate) async fn delete_project(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state.services.delete_project(&principal, project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/api-key/regenerate",
    tag = "projects",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses((status = 200, description = "New API key", body = ApiKeyResponse))
)]
pub(crate) async fn regenerate_api_key(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .regenerate_api_key(&principal, project_id)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/archive",
    tag = "projects",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses(
        (status = 200, description = "Project archived", body = ProjectResponse),
        (status = 400, description = "Project already archived", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn archive_project(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProjectResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .set_project_archived(&principal, project_id, true)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/unarchive",
    tag = "projects",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses(
        (status = 200, description = "Project restored", body = ProjectResponse),
        (status = 400, description = "Project is not archived", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn unarchive_project(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProjectResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .set_project_archived(&principal, project_id, false)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/my-permissions",
    tag = "projects",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses((status = 200, description = "Caller's grants in the project", body = PermissionsResponse))
)]
pub(crate) async fn my_permissions(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state.services.my_permissions(&principal, project_id).await?,
    ))
}
