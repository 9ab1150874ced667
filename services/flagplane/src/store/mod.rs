//! Storage abstraction for flagplane.
//!
//! # Purpose
//! Splits persistence into the catalog (users, projects, scopes, flags, flag
//! values) and the permission store (memberships plus project and scope
//! grants). Both backends implement both traits; [`FlagplaneStore`] is the
//! combined object the service layer holds.
//!
//! # Key invariants
//! - Composite writes (project creation, scope deletion, permission
//!   replacement) are atomic in each backend.
//! - Grant add/remove is idempotent: adding an existing grant or removing a
//!   missing one is a no-op, not an error.
//! - Deleting a project cascades to every dependent row; deleting a scope
//!   removes its grants and flag values explicitly.
//! - A project keeps at least one active holder of each guarded permission
//!   (`manage_users`, `delete_project`). Member removal, grant revocation and
//!   grant replacement check this under the same lock or transaction as the
//!   delete and fail with [`StoreError::LastHolder`].
use crate::model::{
    Flag, FlagValue, FlagValueRecord, MemberPermissions, Membership, Project, Scope, ScopeGrant,
    User,
};
use async_trait::async_trait;
use flagplane_authz::{ProjectPermission, ScopePermission};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("last active holder of {0}")]
    LastHolder(ProjectPermission),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".into()),
            other => StoreError::Unexpected(other.into()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(value.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything inserted atomically when a project is created.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub project: Project,
    pub scopes: Vec<Scope>,
    pub owner_permissions: Vec<ProjectPermission>,
}

/// A membership to create together with its initial grants.
#[derive(Debug, Clone)]
pub struct NewMembership {
    pub membership: Membership,
    pub project_permissions: Vec<ProjectPermission>,
    pub scope_grants: Vec<ScopeGrant>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn count_users(&self) -> StoreResult<u64>;
    async fn create_user(&self, user: User) -> StoreResult<User>;
    async fn get_user(&self, user_id: Uuid) -> StoreResult<User>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn update_user(&self, user: User) -> StoreResult<User>;

    async fn create_project(&self, new: NewProject) -> StoreResult<Project>;
    async fn get_project(&self, project_id: Uuid) -> StoreResult<Project>;
    async fn find_project_by_alias(&self, alias: &str) -> StoreResult<Option<Project>>;
    async fn find_project_by_api_key(&self, api_key: &str) -> StoreResult<Option<Project>>;
    async fn list_projects(&self, include_archived: bool) -> StoreResult<Vec<Project>>;
    async fn list_projects_for_user(
        &self,
        user_id: Uuid,
        include_archived: bool,
    ) -> StoreResult<Vec<Project>>;
    async fn update_project(&self, project: Project) -> StoreResult<Project>;
    async fn delete_project(&self, project_id: Uuid) -> StoreResult<()>;

    /// Inserts the scope and a disabled value for every existing flag.
    async fn create_scope(&self, scope: Scope) -> StoreResult<Scope>;
    async fn get_scope(&self, scope_id: Uuid) -> StoreResult<Scope>;
    async fn find_scope_by_alias(&self, project_id: Uuid, alias: &str)
    -> StoreResult<Option<Scope>>;
    async fn list_scopes(&self, project_id: Uuid) -> StoreResult<Vec<Scope>>;
    async fn update_scope(&self, scope: Scope) -> StoreResult<Scope>;
    /// Removes the scope, its grants, and its flag values.
    async fn delete_scope(&self, scope_id: Uuid) -> StoreResult<()>;

    /// Inserts the flag and a disabled value for every existing scope.
    async fn create_flag(&self, flag: Flag) -> StoreResult<Flag>;
    async fn get_flag(&self, flag_id: Uuid) -> StoreResult<Flag>;
    async fn find_flag_by_key(&self, project_id: Uuid, key: &str) -> StoreResult<Option<Flag>>;
    async fn list_flags(&self, project_id: Uuid) -> StoreResult<Vec<Flag>>;
    async fn update_flag(&self, flag: Flag) -> StoreResult<Flag>;
    async fn delete_flag(&self, flag_id: Uuid) -> StoreResult<()>;

    async fn list_flag_values(&self, flag_id: Uuid) -> StoreResult<Vec<FlagValue>>;
    async fn list_scope_values(&self, scope_id: Uuid) -> StoreResult<Vec<FlagValue>>;
    async fn get_flag_value(&self, flag_id: Uuid, scope_id: Uuid)
    -> StoreResult<Option<FlagValue>>;
    /// Upserts the `(flag, scope)` row.
    async fn set_flag_value(&self, value: FlagValue) -> StoreResult<FlagValue>;
    /// Resolves a value through aliases, the shape the evaluation path reads.
    async fn lookup_flag_value(
        &self,
        project_alias: &str,
        scope_alias: &str,
        flag_key: &str,
    ) -> StoreResult<Option<FlagValueRecord>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn is_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<bool>;
    async fn get_membership(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<Membership>>;
    async fn list_members(&self, project_id: Uuid) -> StoreResult<Vec<Membership>>;
    /// Fails with `Conflict` when the membership already exists.
    async fn add_member(&self, new: NewMembership) -> StoreResult<Membership>;
    /// Removes the membership and every grant hanging off it. `LastHolder`
    /// when the member is the only active holder of a guarded permission.
    async fn remove_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<()>;

    async fn has_project_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permission: ProjectPermission,
    ) -> StoreResult<bool>;
    async fn has_scope_permission(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        permission: ScopePermission,
    ) -> StoreResult<bool>;
    async fn list_project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeSet<ProjectPermission>>;
    async fn list_scope_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeMap<Uuid, BTreeSet<ScopePermission>>>;

    /// `NotFound` when the user is not a member; duplicate adds are no-ops.
    async fn grant_project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permissions: &[ProjectPermission],
    ) -> StoreResult<()>;
    /// Missing grants are a no-op. `LastHolder` when no other active member
    /// holds a guarded `permission`.
    async fn revoke_project_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permission: ProjectPermission,
    ) -> StoreResult<()>;
    async fn grant_scope_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        grants: &[ScopeGrant],
    ) -> StoreResult<()>;
    async fn revoke_scope_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        grant: ScopeGrant,
    ) -> StoreResult<()>;
    /// Swaps the member's whole grant set in one atomic write. `LastHolder`
    /// when a guarded permission dropped by the swap has no other active holder.
    async fn replace_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permissions: &MemberPermissions,
    ) -> StoreResult<()>;
}

pub trait FlagplaneStore: CatalogStore + PermissionStore {}

impl<T: CatalogStore + PermissionStore> FlagplaneStore for T {}
