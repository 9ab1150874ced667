//! Membership and grant handlers.
//!
//! Every mutating route requires `manage_users` on the project; the
//! last-holder and self-revocation refusals surface as `400`.
use crate::api::error::ApiError;
use crate::api::types::{
    AssignProjectPermissionsRequest, AssignScopePermissionsRequest, AvailableUserListResponse,
    InviteMemberRequest, MemberListResponse, MemberResponse,
};
use crate::app::AppState;
use crate::auth::require_principal;
use crate::model::MemberPermissions;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use flagplane_authz::{ProjectPermission, ScopePermission};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/members",
    tag = "members",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses((status = 200, description = "Members with their grants", body = MemberListResponse))
)]
pub(crate) async fn list_members(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MemberListResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let items = state.services.list_members(&principal, project_id).await?;
    Ok(Json(MemberListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/members",
    tag = "members",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    request_body = InviteMemberRequest,
    responses(
        (status = 201, description = "Member added", body = MemberResponse),
        (status = 400, description = "User inactive or already a member", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn invite_member(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InviteMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let member = state
        .services
        .invite_member(&principal, project_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/members/available",
    tag = "members",
    params(("project_id" = Uuid, Path, description = "Project identifier")),
    responses((status = 200, description = "Active users marked by membership", body = AvailableUserListResponse))
)]
pub(crate) async fn available_users(
    Path(project_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AvailableUserListResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    let items = state
        .services
        .available_users(&principal, project_id)
        .await?;
    Ok(Json(AvailableUserListResponse { items }))
}

#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}/members/{user_id}",
    tag = "members",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("user_id" = Uuid, Path, description = "Member user identifier")
    ),
    responses((status = 200, description = "Member", body = MemberResponse))
)]
pub(crate) async fn get_member(
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MemberResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .get_member(&principal, project_id, user_id)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}/members/{user_id}",
    tag = "members",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("user_id" = Uuid, Path, description = "Member user identifier")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 400, description = "Member is the last holder of a guarded permission", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn remove_member(
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state
        .services
        .remove_member(&principal, project_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/projects/{project_id}/members/{user_id}/permissions",
    tag = "members",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("user_id" = Uuid, Path, description = "Member user identifier")
    ),
    request_body = MemberPermissions,
    responses((status = 200, description = "Grants replaced", body = MemberResponse))
)]
pub(crate) async fn replace_permissions(
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MemberPermissions>,
) -> Result<Json<MemberResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .replace_member_permissions(&principal, project_id, user_id, body)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/members/{user_id}/project-permissions",
    tag = "members",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("user_id" = Uuid, Path, description = "Member user identifier")
    ),
    request_body = AssignProjectPermissionsRequest,
    responses((status = 200, description = "Grants added", body = MemberResponse))
)]
pub(crate) async fn assign_project_permissions(
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AssignProjectPermissionsRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .assign_project_permissions(&principal, project_id, user_id, body.permissions)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}/members/{user_id}/project-permissions/{permission}",
    tag = "members",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("user_id" = Uuid, Path, description = "Member user identifier"),
        ("permission" = ProjectPermission, Path, description = "Project permission")
    ),
    responses((status = 204, description = "Grant revoked"))
)]
pub(crate) async fn revoke_project_permission(
    Path((project_id, user_id, permission)): Path<(Uuid, Uuid, ProjectPermission)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state
        .services
        .revoke_project_permission(&principal, project_id, user_id, permission)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/projects/{project_id}/members/{user_id}/scope-permissions",
    tag = "members",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("user_id" = Uuid, Path, description = "Member user identifier")
    ),
    request_body = AssignScopePermissionsRequest,
    responses((status = 200, description = "Scope grants added", body = MemberResponse))
)]
pub(crate) async fn assign_scope_permissions(
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AssignScopePermissionsRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .assign_scope_permissions(&principal, project_id, user_id, body.grants)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}/members/{user_id}/scope-permissions/{scope_id}/{permission}",
    tag = "members",
    params(
        ("project_id" = Uuid, Path, description = "Project identifier"),
        ("user_id" = Uuid, Path, description = "Member user identifier"),
        ("scope_id" = Uuid, Path, description = "Scope identifier"),
        ("permission" = ScopePermission, Path, description = "Scope permission")
    ),
    responses((status = 204, description = "Scope grant revoked"))
)]
pub(crate) async fn revoke_scope_permission(
    Path((project_id, user_id, scope_id, permission)): Path<(Uuid, Uuid, Uuid, ScopePermission)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state
        .services
        .revoke_scope_permission(&principal, project_id, user_id, scope_id, permission)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
