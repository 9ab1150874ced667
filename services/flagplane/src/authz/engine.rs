//! Permission engine.
//!
//! # Purpose
//! Answers "may user U do X on project/scope R" by composing the global-admin
//! bypass with direct lookups in the permission store.
//!
//! # Key invariants
//! - The admin bypass lives in exactly one place, [`PermissionEngine::bypass_or`].
//!   Every public check routes through it.
//! - Only an *active* user with the `admin` role is an admin, and the role is
//!   read live from the store on every check.
//! - Non-admin answers are pure existence checks: project grants never imply
//!   scope grants and scope grants never imply project access.
//! - A missing grant is `Ok(false)`, never an error. Errors mean the store failed.
use crate::store::{CatalogStore, FlagplaneStore, PermissionStore, StoreError, StoreResult};
use flagplane_authz::{ProjectPermission, ScopePermission};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct PermissionEngine {
    store: Arc<dyn FlagplaneStore>,
}

impl PermissionEngine {
    pub fn new(store: Arc<dyn FlagplaneStore>) -> Self {
        Self { store }
    }

    pub async fn is_admin(&self, user_id: Uuid) -> StoreResult<bool> {
        match self.store.get_user(user_id).await {
            Ok(user) => Ok(user.is_admin()),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Resolves `admin` for admins and `member` for everyone else. Both
    /// futures are lazy; only the chosen one is polled.
    async fn bypass_or<T>(
        &self,
        user_id: Uuid,
        admin: impl Future<Output = StoreResult<T>>,
        member: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        if self.is_admin(user_id).await? {
            tracing::debug!(%user_id, "admin bypass");
            admin.await
        } else {
            member.await
        }
    }

    pub async fn is_project_member(&self, user_id: Uuid, project_id: Uuid) -> StoreResult<bool> {
        self.bypass_or(
            user_id,
            std::future::ready(Ok(true)),
            self.store.is_member(user_id, project_id),
        )
        .await
    }

    pub async fn has_project_permission(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        permission: ProjectPermission,
    ) -> StoreResult<bool> {
        self.bypass_or(
            user_id,
            std::future::ready(Ok(true)),
            self.store
                .has_project_permission(user_id, project_id, permission),
        )
        .await
    }

    pub async fn has_scope_permission(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        permission: ScopePermission,
    ) -> StoreResult<bool> {
        self.bypass_or(
            user_id,
            std::future::ready(Ok(true)),
            self.store.has_scope_permission(user_id, scope_id, permission),
        )
        .await
    }

    pub async fn list_project_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeSet<ProjectPermission>> {
        self.bypass_or(
            user_id,
            std::future::ready(Ok(ProjectPermission::ALL.into_iter().collect())),
            self.store.list_project_permissions(user_id, project_id),
        )
        .await
    }

    /// For admins every scope of the project maps to the full scope enumeration.
    pub async fn list_scope_permissions(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<BTreeMap<Uuid, BTreeSet<ScopePermission>>> {
        self.bypass_or(
            user_id,
            async {
                let all: BTreeSet<ScopePermission> = ScopePermission::ALL.into_iter().collect();
                let scopes = self.store.list_scopes(project_id).await?;
                let map: BTreeMap<Uuid, BTreeSet<ScopePermission>> = scopes
                    .into_iter()
                    .map(|scope| (scope.id, all.clone()))
                    .collect();
                Ok::<_, StoreError>(map)
            },
            self.store.list_scope_permissions(user_id, project_id),
        )
        .await
    }
}
