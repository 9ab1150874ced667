//! HTTP API request/response types.
//!
//! # Purpose
//! Defines transport-only payload shapes (list envelopes, query strings,
//! errors) and re-exports the service operation types so handlers and the
//! OpenAPI document import from one place.
use crate::model::{Scope, ScopeGrant, User};
use crate::service::error::FieldError;
use flagplane_authz::ProjectPermission;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub use crate::service::types::{
    ApiKeyResponse, AvailableUser, ChangePasswordRequest, CreateFlagRequest, CreateProjectRequest,
    CreateScopeRequest, CreateUserRequest, EvaluateAllResponse, EvaluationContext, FlagEvaluation,
    FlagMetadata, FlagResponse, InviteMemberRequest, LoginResponse, MemberResponse,
    PermissionsResponse, ProjectDetailResponse, ProjectResponse, UpdateFlagRequest,
    UpdateProjectRequest, UpdateScopeRequest, UpdateUserRequest,
};

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub storage: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

// auth

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// users

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UserListResponse {
    pub items: Vec<User>,
}

// projects

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListProjectsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ProjectListResponse {
    pub items: Vec<ProjectResponse>,
}

// scopes

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ScopeListResponse {
    pub items: Vec<Scope>,
}

// flags

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpdateFlagValueRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct FlagListResponse {
    pub items: Vec<FlagResponse>,
}

// members

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MemberListResponse {
    pub items: Vec<MemberResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AvailableUserListResponse {
    pub items: Vec<AvailableUser>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AssignProjectPermissionsRequest {
    pub permissions: Vec<ProjectPermission>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AssignScopePermissionsRequest {
    pub grants: Vec<ScopeGrant>,
}

// sdk

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeatureQuery {
    pub flag_key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct FeatureValueResponse {
    pub flag_key: String,
    pub scope: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct EvaluateFlagRequest {
    pub flag_key: String,
    pub context: EvaluationContext,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct EvaluateAllRequest {
    pub context: EvaluationContext,
}
