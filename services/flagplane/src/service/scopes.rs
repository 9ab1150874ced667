//! Scope use-cases.
use super::error::Validator;
use super::{ServiceError, ServiceResult, Services};
use crate::service::types::{CreateScopeRequest, UpdateScopeRequest};
use crate::auth::principal::Principal;
use crate::authz::Requirement;
use crate::cache::CacheTag;
use crate::model::Scope;
use crate::observability::audit;
use crate::store::CatalogStore;
use chrono::Utc;
use flagplane_authz::ProjectPermission;
use uuid::Uuid;

const MANAGE_SCOPES: Requirement = Requirement::Project(ProjectPermission::ManageScopes);

impl Services {
    pub async fn list_scopes(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> ServiceResult<Vec<Scope>> {
        self.authorize(principal, Some(project_id), Requirement::ProjectMember)
            .await?;
        self.project(project_id).await?;
        Ok(self.store.list_scopes(project_id).await?)
    }

    /// New scopes go after every existing one and start with every flag disabled.
    pub async fn create_scope(
        &self,
        principal: &Principal,
        project_id: Uuid,
        request: CreateScopeRequest,
    ) -> ServiceResult<Scope> {
        self.authorize(principal, Some(project_id), MANAGE_SCOPES)
            .await?;
        let project = self.project(project_id).await?;
        Validator::default()
            .alias("alias", &request.alias)
            .name("name", &request.name)
            .finish()?;
        let existing = self.store.list_scopes(project_id).await?;
        if existing.iter().any(|scope| scope.alias == request.alias) {
            return Err(ServiceError::BadRequest(format!(
                "scope alias '{}' already exists",
                request.alias
            )));
        }
        let index = existing
            .iter()
            .map(|scope| scope.index)
            .max()
            .map_or(0, |max| max + 1);
        let scope = self
            .store
            .create_scope(Scope {
                id: Uuid::new_v4(),
                project_id,
                alias: request.alias,
                name: request.name.trim().to_string(),
                description: request.description,
                index,
                created_at: Utc::now(),
            })
            .await?;
        audit(&principal.username, &project.alias, "scope", "create");
        Ok(scope)
    }

    pub async fn update_scope(
        &self,
        principal: &Principal,
        project_id: Uuid,
        scope_id: Uuid,
        request: UpdateScopeRequest,
    ) -> ServiceResult<Scope> {
        self.authorize(principal, Some(project_id), MANAGE_SCOPES)
            .await?;
        let project = self.project(project_id).await?;
        let mut scope = self.project_scope(project_id, scope_id).await?;
        let mut validator = Validator::default();
        if let Some(alias) = &request.alias {
            validator.alias("alias", alias);
        }
        if let Some(name) = &request.name {
            validator.name("name", name);
        }
        validator.finish()?;

        let old_alias = scope.alias.clone();
        if let Some(alias) = request.alias
            && alias != scope.alias
        {
            if self
                .store
                .find_scope_by_alias(project_id, &alias)
                .await?
                .is_some()
            {
                return Err(ServiceError::BadRequest(format!(
                    "scope alias '{alias}' already exists"
                )));
            }
            scope.alias = alias;
        }
        if let Some(name) = request.name {
            scope.name = name.trim().to_string();
        }
        if request.description.is_some() {
            scope.description = request.description;
        }
        let scope = self.store.update_scope(scope).await?;

        if scope.alias != old_alias {
            self.invalidate(&[CacheTag::ProjectScope(project.alias.clone(), old_alias)])
                .await;
        }
        audit(&principal.username, &project.alias, "scope", "update");
        Ok(scope)
    }

    /// Removes the scope with its values and grants, then evicts its cache tag.
    pub async fn delete_scope(
        &self,
        principal: &Principal,
        project_id: Uuid,
        scope_id: Uuid,
    ) -> ServiceResult<()> {
        self.authorize(principal, Some(project_id), MANAGE_SCOPES)
            .await?;
        let project = self.project(project_id).await?;
        let scope = self.project_scope(project_id, scope_id).await?;
        self.store.delete_scope(scope.id).await?;
        self.invalidate(&[CacheTag::ProjectScope(project.alias.clone(), scope.alias)])
            .await;
        audit(&principal.username, &project.alias, "scope", "delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::types::{CreateFlagRequest, InviteMemberRequest};
    use crate::model::ScopeGrant;
    use crate::service::testing::harness;
    use crate::store::CatalogStore;
    use flagplane_authz::{GlobalRole, ScopePermission};

    fn new_scope(alias: &str) -> CreateScopeRequest {
        CreateScopeRequest {
            alias: alias.into(),
            name: alias.to_uppercase(),
            description: None,
        }
    }

    #[tokio::test]
    async fn new_scope_is_appended_and_backfilled() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let flag = h
            .services
            .create_flag(
                &owner,
                project.id,
                CreateFlagRequest {
                    key: "checkout".into(),
                    name: "Checkout".into(),
                    description: None,
                },
            )
            .await
            .expect("flag");

        let qa = h
            .services
            .create_scope(&owner, project.id, new_scope("qa"))
            .await
            .expect("scope");
        assert_eq!(qa.index, 3);
        let value = h
            .store
            .get_flag_value(flag.flag.id, qa.id)
            .await
            .expect("lookup")
            .expect("backfilled");
        assert!(!value.enabled);
    }

    #[tokio::test]
    async fn duplicate_alias_in_project_is_rejected() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let err = h
            .services
            .create_scope(&owner, project.id, new_scope("dev"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ServiceError::BadRequest(_)));
        let other = h.project(&owner, "globex").await;
        assert!(h.services.create_scope(&owner, other.id, new_scope("qa")).await.is_ok());
    }

    #[tokio::test]
    async fn members_without_manage_scopes_cannot_create() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let member = h.user("member", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        h.services
            .invite_member(
                &owner,
                project.id,
                InviteMemberRequest {
                    user_id: member.user_id,
                    project_permissions: vec![],
                    scope_permissions: vec![],
                },
            )
            .await
            .expect("invite");
        assert_eq!(
            h.services.list_scopes(&member, project.id).await.expect("list").len(),
            3
        );
        let err = h
            .services
            .create_scope(&member, project.id, new_scope("qa"))
            .await
            .expect_err("forbidden");
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn deleting_scope_drops_its_grants() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let member = h.user("member", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let dev = h.scope(&project, "dev").await;
        h.services
            .invite_member(
                &owner,
                project.id,
                InviteMemberRequest {
                    user_id: member.user_id,
                    project_permissions: vec![],
                    scope_permissions: vec![ScopeGrant {
                        scope_id: dev.id,
                        permission: ScopePermission::ReadFeatureFlags,
                    }],
                },
            )
            .await
            .expect("invite");
        assert!(h
            .services
            .engine()
            .has_scope_permission(member.user_id, dev.id, ScopePermission::ReadFeatureFlags)
            .await
            .expect("check"));

        h.services
            .delete_scope(&owner, project.id, dev.id)
            .await
            .expect("delete");
        assert!(!h
            .services
            .engine()
            .has_scope_permission(member.user_id, dev.id, ScopePermission::ReadFeatureFlags)
            .await
            .expect("check"));
    }

    #[tokio::test]
    async fn scope_from_other_project_is_not_found() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let acme = h.project(&owner, "acme").await;
        let globex = h.project(&owner, "globex").await;
        let foreign = h.scope(&globex, "dev").await;
        let err = h
            .services
            .delete_scope(&owner, acme.id, foreign.id)
            .await
            .expect_err("foreign");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn rename_keeps_alias_unique() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let dev = h.scope(&project, "dev").await;
        let err = h
            .services
            .update_scope(
                &owner,
                project.id,
                dev.id,
                UpdateScopeRequest {
                    alias: Some("staging".into()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("taken");
        assert!(matches!(err, ServiceError::BadRequest(_)));
        let renamed = h
            .services
            .update_scope(
                &owner,
                project.id,
                dev.id,
                UpdateScopeRequest {
                    alias: Some("development".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("rename");
        assert_eq!(renamed.alias, "development");
    }
}
