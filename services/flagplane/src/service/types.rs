//! Inputs and outputs of service operations.
//!
//! The HTTP layer serializes these directly; `api::types` re-exports them
//! next to its transport-only shapes.
use crate::model::{Flag, FlagValue, Project, Scope, ScopeGrant, User};
use chrono::{DateTime, Utc};
use flagplane_authz::{GlobalRole, ProjectPermission, ScopePermission};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use utoipa::ToSchema;
use uuid::Uuid;

// auth

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// users

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateUserRequest {
    pub username: String,
    pub full_name: String,
    pub temporary_password: String,
    #[serde(default)]
    pub role: GlobalRole,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<GlobalRole>,
}

// projects

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateProjectRequest {
    pub alias: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpdateProjectRequest {
    pub alias: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A project as seen by one caller. `api_key` is only present for holders
/// of `view_api_key`.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub alias: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub is_archived: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectResponse {
    pub fn new(project: Project, reveal_key: bool) -> Self {
        Self {
            id: project.id,
            alias: project.alias,
            name: project.name,
            description: project.description,
            api_key: reveal_key.then_some(project.api_key),
            is_archived: project.is_archived,
            created_by: project.created_by,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ApiKeyResponse {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct PermissionsResponse {
    pub project_permissions: BTreeSet<ProjectPermission>,
    pub scope_permissions: BTreeMap<Uuid, BTreeSet<ScopePermission>>,
}

// scopes

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateScopeRequest {
    pub alias: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpdateScopeRequest {
    pub alias: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

// flags

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateFlagRequest {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpdateFlagRequest {
    pub key: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct FlagResponse {
    #[serde(flatten)]
    pub flag: Flag,
    pub values: Vec<FlagValue>,
}

// members

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct InviteMemberRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub project_permissions: Vec<ProjectPermission>,
    #[serde(default)]
    pub scope_permissions: Vec<ScopeGrant>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub username: String,
    pub full_name: String,
    pub joined_at: DateTime<Utc>,
    pub project_permissions: BTreeSet<ProjectPermission>,
    pub scope_permissions: BTreeMap<Uuid, BTreeSet<ScopePermission>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AvailableUser {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub is_member: bool,
}

// evaluation

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct EvaluationContext {
    pub scope: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct FlagMetadata {
    pub scope: String,
    pub scope_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct FlagEvaluation {
    pub flag_key: String,
    pub value: bool,
    pub variant: String,
    pub reason: String,
    pub flag_metadata: FlagMetadata,
}

impl FlagEvaluation {
    pub fn new(flag_key: String, enabled: bool, scope: &Scope, updated_at: DateTime<Utc>) -> Self {
        let variant = if enabled { "enabled" } else { "disabled" };
        Self {
            flag_key,
            value: enabled,
            variant: variant.to_string(),
            reason: "STATIC".to_string(),
            flag_metadata: FlagMetadata {
                scope: scope.alias.clone(),
                scope_id: scope.id,
                updated_at,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct EvaluateAllResponse {
    pub flags: Vec<FlagEvaluation>,
}
