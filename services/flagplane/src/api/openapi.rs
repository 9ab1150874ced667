//! OpenAPI schema aggregation for the flagplane API.
use crate::api::{
    auth, flags, members, projects, scopes, sdk, system,
    types::{
        ApiKeyResponse, AssignProjectPermissionsRequest, AssignScopePermissionsRequest,
        AvailableUser, AvailableUserListResponse, ChangePasswordRequest, CreateFlagRequest,
        CreateProjectRequest, CreateScopeRequest, CreateUserRequest, ErrorResponse,
        EvaluateAllRequest, EvaluateAllResponse, EvaluateFlagRequest, EvaluationContext,
        FeatureValueResponse, FlagEvaluation, FlagListResponse, FlagMetadata, FlagResponse,
        HealthStatus, InviteMemberRequest, LoginRequest, LoginResponse, MemberListResponse,
        MemberResponse, PermissionsResponse, ProjectDetailResponse, ProjectListResponse,
        ProjectResponse, ScopeListResponse, UpdateFlagRequest, UpdateFlagValueRequest,
        UpdateProjectRequest, UpdateScopeRequest, UpdateUserRequest, UserListResponse,
    },
    users,
};
use crate::model::{Flag, FlagValue, MemberPermissions, Scope, ScopeGrant, User};
use crate::service::FieldError;
use flagplane_authz::{GlobalRole, ProjectPermission, ScopePermission};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "flagplane",
        version = "v1",
        description = "Multi-tenant feature flag management and evaluation API"
    ),
    paths(
        system::system_health,
        auth::login,
        auth::logout,
        auth::me,
        auth::change_password,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::deactivate_user,
        projects::list_projects,
        projects::create_project,
        projects::get_project,
        projects::update_project,
        projects::delete_project,
        projects::regenerate_api_key,
        projects::archive_project,
        projects::unarchive_project,
        projects::my_permissions,
        scopes::list_scopes,
        scopes::create_scope,
        scopes::update_scope,
        scopes::delete_scope,
        flags::list_flags,
        flags::create_flag,
        flags::get_flag,
        flags::update_flag,
        flags::delete_flag,
        flags::update_flag_value,
        members::list_members,
        members::invite_member,
        members::available_users,
        members::get_member,
        members::remove_member,
        members::replace_permissions,
        members::assign_project_permissions,
        members::revoke_project_permission,
        members::assign_scope_permissions,
        members::revoke_scope_permission,
        sdk::get_feature,
        sdk::evaluate_flag,
        sdk::evaluate_all
    ),
    components(schemas(
        HealthStatus,
        ErrorResponse,
        FieldError,
        GlobalRole,
        ProjectPermission,
        ScopePermission,
        User,
        Scope,
        Flag,
        FlagValue,
        ScopeGrant,
        MemberPermissions,
        LoginRequest,
        LoginResponse,
        ChangePasswordRequest,
        CreateUserRequest,
        UpdateUserRequest,
        UserListResponse,
        CreateProjectRequest,
        UpdateProjectRequest,
        ProjectResponse,
        ProjectDetailResponse,
        ProjectListResponse,
        ApiKeyResponse,
        PermissionsResponse,
        CreateScopeRequest,
        UpdateScopeRequest,
        ScopeListResponse,
        CreateFlagRequest,
        UpdateFlagRequest,
        UpdateFlagValueRequest,
        FlagResponse,
        FlagListResponse,
        InviteMemberRequest,
        MemberResponse,
        MemberListResponse,
        AvailableUser,
        AvailableUserListResponse,
        AssignProjectPermissionsRequest,
        AssignScopePermissionsRequest,
        FeatureValueResponse,
        EvaluationContext,
        EvaluateFlagRequest,
        EvaluateAllRequest,
        FlagMetadata,
        FlagEvaluation,
        EvaluateAllResponse
    )),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "auth", description = "Sign-in and account self-service"),
        (name = "users", description = "User administration"),
        (name = "projects", description = "Project management"),
        (name = "scopes", description = "Scope management"),
        (name = "flags", description = "Flag and flag value management"),
        (name = "members", description = "Project membership and grants"),
        (name = "sdk", description = "API-key authenticated flag evaluation")
    )
)]
pub struct ApiDoc;
