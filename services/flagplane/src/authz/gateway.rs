//! Authorization gateway.
//!
//! # Purpose
//! Turns one protected action into one policy question and one decision. The
//! caller supplies the acting principal (if any) and the target identifier
//! taken from the request path or query, never from the body.
//!
//! # State machine
//! `Unresolved -> Denied` when the principal or the target id is missing, or
//! `Unresolved -> Resolved -> {Allowed, Denied}` once both are present.
//!
//! # Key invariants
//! - Fail closed: missing identity or missing target is a denial, not a skip.
//! - Decisions are never cached. A revoked grant takes effect on the next check.
use crate::auth::principal::Principal;
use crate::authz::engine::PermissionEngine;
use crate::store::StoreResult;
use flagplane_authz::{ProjectPermission, ScopePermission};
use uuid::Uuid;

/// What a protected action needs from the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Global admin; no target.
    Admin,
    /// Membership of the target project.
    ProjectMember,
    /// A project grant on the target project.
    Project(ProjectPermission),
    /// A scope grant on the target scope.
    Scope(ScopePermission),
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requirement::Admin => f.write_str("admin"),
            Requirement::ProjectMember => f.write_str("project_member"),
            Requirement::Project(permission) => write!(f, "{permission}"),
            Requirement::Scope(permission) => write!(f, "{permission}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoIdentity,
    NoResource,
    MissingGrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

#[derive(Clone)]
pub struct AuthorizationGateway {
    engine: PermissionEngine,
}

impl AuthorizationGateway {
    pub fn new(engine: PermissionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    pub async fn decide(
        &self,
        principal: Option<&Principal>,
        target: Option<Uuid>,
        requirement: Requirement,
    ) -> StoreResult<Decision> {
        let Some(principal) = principal else {
            return Ok(self.deny(None, requirement, DenyReason::NoIdentity));
        };
        let user_id = principal.user_id;
        let allowed = match (requirement, target) {
            (Requirement::Admin, _) => self.engine.is_admin(user_id).await?,
            (_, None) => {
                return Ok(self.deny(Some(user_id), requirement, DenyReason::NoResource));
            }
            (Requirement::ProjectMember, Some(project_id)) => {
                self.engine.is_project_member(user_id, project_id).await?
            }
            (Requirement::Project(permission), Some(project_id)) => {
                self.engine
                    .has_project_permission(user_id, project_id, permission)
                    .await?
            }
            (Requirement::Scope(permission), Some(scope_id)) => {
                self.engine
                    .has_scope_permission(user_id, scope_id, permission)
                    .await?
            }
        };
        if allowed {
            Ok(Decision::Allowed)
        } else {
            Ok(self.deny(Some(user_id), requirement, DenyReason::MissingGrant))
        }
    }

    fn deny(&self, user_id: Option<Uuid>, requirement: Requirement, reason: DenyReason) -> Decision {
        metrics::counter!("flagplane_authz_denied_total").increment(1);
        tracing::info!(
            user_id = ?user_id,
            requirement = %requirement,
            reason = ?reason,
            "authorization denied"
        );
        Decision::Denied(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, User};
    use crate::store::memory::InMemoryStore;
    use crate::store::{CatalogStore, NewProject};
    use chrono::Utc;
    use flagplane_authz::GlobalRole;
    use std::sync::Arc;

    async fn fixture() -> (AuthorizationGateway, Principal, Project) {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let owner = store
            .create_user(User {
                id: Uuid::new_v4(),
                username: "owner".to_string(),
                full_name: "Owner".to_string(),
                role: GlobalRole::User,
                is_active: true,
                must_change_password: false,
                password_hash: String::new(),
                created_at: now,
                last_login_at: None,
            })
            .await
            .expect("owner");
        let project = Project {
            id: Uuid::new_v4(),
            alias: "acme".to_string(),
            name: "Acme".to_string(),
            description: None,
            api_key: "key".to_string(),
            is_archived: false,
            created_by: owner.id,
            created_at: now,
            updated_at: now,
        };
        store
            .create_project(NewProject {
                project: project.clone(),
                scopes: vec![],
                owner_permissions: vec![ProjectPermission::ManageUsers],
            })
            .await
            .expect("project");
        let gateway = AuthorizationGateway::new(PermissionEngine::new(store));
        (gateway, Principal::from(&owner), project)
    }

    #[tokio::test]
    async fn missing_identity_is_denied() {
        let (gateway, _, project) = fixture().await;
        let decision = gateway
            .decide(None, Some(project.id), Requirement::ProjectMember)
            .await
            .expect("decide");
        assert_eq!(decision, Decision::Denied(DenyReason::NoIdentity));
    }

    #[tokio::test]
    async fn missing_target_is_denied() {
        let (gateway, principal, _) = fixture().await;
        let decision = gateway
            .decide(
                Some(&principal),
                None,
                Requirement::Project(ProjectPermission::ManageUsers),
            )
            .await
            .expect("decide");
        assert_eq!(decision, Decision::Denied(DenyReason::NoResource));
    }

    #[tokio::test]
    async fn grants_decide_allow_and_deny() {
        let (gateway, principal, project) = fixture().await;
        let allowed = gateway
            .decide(
                Some(&principal),
                Some(project.id),
                Requirement::Project(ProjectPermission::ManageUsers),
            )
            .await
            .expect("decide");
        assert_eq!(allowed, Decision::Allowed);
        let denied = gateway
            .decide(
                Some(&principal),
                Some(project.id),
                Requirement::Project(ProjectPermission::DeleteProject),
            )
            .await
            .expect("decide");
        assert_eq!(denied, Decision::Denied(DenyReason::MissingGrant));
        let not_admin = gateway
            .decide(Some(&principal), None, Requirement::Admin)
            .await
            .expect("decide");
        assert_eq!(not_admin, Decision::Denied(DenyReason::MissingGrant));
    }
}
