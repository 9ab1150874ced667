//! Membership and grant use-cases.
//!
//! Every mutation here requires `manage_users` on the project. Two invariants
//! hold across these calls:
//! - a project keeps at least one active holder of each guarded permission
//!   (`manage_users`, `delete_project`). The store checks this atomically
//!   with the delete and the refusal surfaces as `BadRequest`;
//! - nobody revokes their own `manage_users`.
use super::{ServiceError, ServiceResult, Services};
use crate::service::types::{AvailableUser, InviteMemberRequest, MemberResponse};
use crate::auth::principal::Principal;
use crate::authz::Requirement;
use crate::model::{MemberPermissions, Membership, ScopeGrant};
use crate::observability::audit;
use crate::store::{CatalogStore, NewMembership, PermissionStore};
use chrono::Utc;
use flagplane_authz::{ProjectPermission, ScopePermission};
use std::collections::HashSet;
use uuid::Uuid;

const MANAGE_USERS: Requirement = Requirement::Project(ProjectPermission::ManageUsers);

impl Services {
    async fn member_response(&self, membership: Membership) -> ServiceResult<MemberResponse> {
        let user = self.store.get_user(membership.user_id).await?;
        let project_permissions = self
            .store
            .list_project_permissions(membership.user_id, membership.project_id)
            .await?;
        let scope_permissions = self
            .store
            .list_scope_permissions(membership.user_id, membership.project_id)
            .await?;
        Ok(MemberResponse {
            user_id: user.id,
            username: user.username,
            full_name: user.full_name,
            joined_at: membership.joined_at,
            project_permissions,
            scope_permissions,
        })
    }

    async fn membership(&self, project_id: Uuid, user_id: Uuid) -> ServiceResult<Membership> {
        self.store
            .get_membership(user_id, project_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("user is not a member of this project".to_string())
            })
    }

    fn ensure_not_self_revoke(
        principal: &Principal,
        user_id: Uuid,
        permission: ProjectPermission,
    ) -> ServiceResult<()> {
        if principal.user_id == user_id && permission == ProjectPermission::ManageUsers {
            tracing::warn!(user_id = %user_id, "refusing self revocation of manage_users");
            return Err(ServiceError::BadRequest(
                "you cannot remove manage_users from yourself".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks every scope exists and belongs to the project before anything is written.
    async fn ensure_project_scopes(
        &self,
        project_id: Uuid,
        scope_ids: impl IntoIterator<Item = Uuid>,
    ) -> ServiceResult<()> {
        for scope_id in scope_ids {
            let scope = self.store.get_scope(scope_id).await?;
            if scope.project_id != project_id {
                return Err(ServiceError::BadRequest(format!(
                    "scope {scope_id} does not belong to this project"
                )));
            }
        }
        Ok(())
    }

    pub async fn invite_member(
        &self,
        principal: &Principal,
        project_id: Uuid,
        request: InviteMemberRequest,
    ) -> ServiceResult<MemberResponse> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        let project = self.project(project_id).await?;
        let user = self.store.get_user(request.user_id).await?;
        if !user.is_active {
            return Err(ServiceError::BadRequest("user is not active".to_string()));
        }
        if self.store.is_member(user.id, project_id).await? {
            return Err(ServiceError::BadRequest(
                "user is already a member of this project".to_string(),
            ));
        }
        let own_scopes: HashSet<Uuid> = self
            .store
            .list_scopes(project_id)
            .await?
            .into_iter()
            .map(|scope| scope.id)
            .collect();
        let scope_grants: Vec<ScopeGrant> = request
            .scope_permissions
            .into_iter()
            .filter(|grant| own_scopes.contains(&grant.scope_id))
            .collect();
        let membership = self
            .store
            .add_member(NewMembership {
                membership: Membership {
                    project_id,
                    user_id: user.id,
                    joined_at: Utc::now(),
                },
                project_permissions: request.project_permissions,
                scope_grants,
            })
            .await
            .map_err(|err| match err {
                crate::store::StoreError::Conflict(_) => ServiceError::BadRequest(
                    "user is already a member of this project".to_string(),
                ),
                other => other.into(),
            })?;
        audit(&principal.username, &project.alias, "member", "invite");
        self.member_response(membership).await
    }

    pub async fn list_members(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> ServiceResult<Vec<MemberResponse>> {
        self.authorize(principal, Some(project_id), Requirement::ProjectMember)
            .await?;
        self.project(project_id).await?;
        let memberships = self.store.list_members(project_id).await?;
        let mut items = Vec::with_capacity(memberships.len());
        for membership in memberships {
            items.push(self.member_response(membership).await?);
        }
        Ok(items)
    }

    pub async fn get_member(
        &self,
        principal: &Principal,
        project_id: Uuid,
        user_id: Uuid,
    ) -> ServiceResult<MemberResponse> {
        self.authorize(principal, Some(project_id), Requirement::ProjectMember)
            .await?;
        let membership = self.membership(project_id, user_id).await?;
        self.member_response(membership).await
    }

    /// Active users, each marked with whether they already belong to the project.
    pub async fn available_users(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> ServiceResult<Vec<AvailableUser>> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        self.project(project_id).await?;
        let members: HashSet<Uuid> = self
            .store
            .list_members(project_id)
            .await?
            .into_iter()
            .map(|membership| membership.user_id)
            .collect();
        Ok(self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|user| user.is_active)
            .map(|user| AvailableUser {
                is_member: members.contains(&user.id),
                id: user.id,
                username: user.username,
                full_name: user.full_name,
            })
            .collect())
    }

    pub async fn remove_member(
        &self,
        principal: &Principal,
        project_id: Uuid,
        user_id: Uuid,
    ) -> ServiceResult<()> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        let project = self.project(project_id).await?;
        self.membership(project_id, user_id).await?;
        self.store.remove_member(user_id, project_id).await?;
        audit(&principal.username, &project.alias, "member", "remove");
        Ok(())
    }

    pub async fn assign_project_permissions(
        &self,
        principal: &Principal,
        project_id: Uuid,
        user_id: Uuid,
        permissions: Vec<ProjectPermission>,
    ) -> ServiceResult<MemberResponse> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        let project = self.project(project_id).await?;
        let membership = self.membership(project_id, user_id).await?;
        self.store
            .grant_project_permissions(user_id, project_id, &permissions)
            .await?;
        audit(&principal.username, &project.alias, "project_permission", "assign");
        self.member_response(membership).await
    }

    pub async fn revoke_project_permission(
        &self,
        principal: &Principal,
        project_id: Uuid,
        user_id: Uuid,
        permission: ProjectPermission,
    ) -> ServiceResult<()> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        let project = self.project(project_id).await?;
        self.membership(project_id, user_id).await?;
        Self::ensure_not_self_revoke(principal, user_id, permission)?;
        self.store
            .revoke_project_permission(user_id, project_id, permission)
            .await?;
        audit(&principal.username, &project.alias, "project_permission", "revoke");
        Ok(())
    }

    pub async fn assign_scope_permissions(
        &self,
        principal: &Principal,
        project_id: Uuid,
        user_id: Uuid,
        grants: Vec<ScopeGrant>,
    ) -> ServiceResult<MemberResponse> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        let project = self.project(project_id).await?;
        let membership = self.membership(project_id, user_id).await?;
        let scope_ids: HashSet<Uuid> = grants.iter().map(|grant| grant.scope_id).collect();
        self.ensure_project_scopes(project_id, scope_ids).await?;
        self.store
            .grant_scope_permissions(user_id, project_id, &grants)
            .await?;
        audit(&principal.username, &project.alias, "scope_permission", "assign");
        self.member_response(membership).await
    }

    pub async fn revoke_scope_permission(
        &self,
        principal: &Principal,
        project_id: Uuid,
        user_id: Uuid,
        scope_id: Uuid,
        permission: ScopePermission,
    ) -> ServiceResult<()> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        let project = self.project(project_id).await?;
        self.membership(project_id, user_id).await?;
        self.ensure_project_scopes(project_id, [scope_id]).await?;
        self.store
            .revoke_scope_permission(user_id, project_id, ScopeGrant { scope_id, permission })
            .await?;
        audit(&principal.username, &project.alias, "scope_permission", "revoke");
        Ok(())
    }

    /// Replaces the member's whole grant set. Scopes are validated before the
    /// write; the store refuses the write if it would drop a last holder.
    pub async fn replace_member_permissions(
        &self,
        principal: &Principal,
        project_id: Uuid,
        user_id: Uuid,
        permissions: MemberPermissions,
    ) -> ServiceResult<MemberResponse> {
        self.authorize(principal, Some(project_id), MANAGE_USERS)
            .await?;
        let project = self.project(project_id).await?;
        let membership = self.membership(project_id, user_id).await?;
        if !permissions
            .project_permissions
            .contains(&ProjectPermission::ManageUsers)
        {
            Self::ensure_not_self_revoke(principal, user_id, ProjectPermission::ManageUsers)?;
        }
        self.ensure_project_scopes(project_id, permissions.scope_permissions.keys().copied())
            .await?;
        self.store
            .replace_permissions(user_id, project_id, &permissions)
            .await?;
        audit(&principal.username, &project.alias, "member_permissions", "replace");
        self.member_response(membership).await
    }
}
