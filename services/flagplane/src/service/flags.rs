//! Flag and flag value use-cases.
use super::error::Validator;
use super::{ServiceError, ServiceResult, Services};
use crate::service::types::{CreateFlagRequest, FlagResponse, UpdateFlagRequest};
use crate::auth::principal::Principal;
use crate::authz::Requirement;
use crate::cache::{CacheTag, FlagCacheKey};
use crate::model::{Flag, FlagValue};
use crate::observability::audit;
use crate::store::CatalogStore;
use chrono::Utc;
use flagplane_authz::{ProjectPermission, ScopePermission};
use uuid::Uuid;

const MANAGE_FLAGS: Requirement = Requirement::Project(ProjectPermission::ManageFeatureFlags);

impl Services {
    async fn flag_response(&self, flag: Flag) -> ServiceResult<FlagResponse> {
        let values = self.store.list_flag_values(flag.id).await?;
        Ok(FlagResponse { flag, values })
    }

    async fn ensure_flag_unique(
        &self,
        project_id: Uuid,
        flag_id: Option<Uuid>,
        key: &str,
        name: &str,
    ) -> ServiceResult<()> {
        let flags = self.store.list_flags(project_id).await?;
        let others = flags.iter().filter(|flag| Some(flag.id) != flag_id);
        for flag in others {
            if flag.key == key {
                return Err(ServiceError::BadRequest(format!(
                    "flag key '{key}' already exists in this project"
                )));
            }
            if flag.name == name {
                return Err(ServiceError::BadRequest(format!(
                    "flag name '{name}' already exists in this project"
                )));
            }
        }
        Ok(())
    }

    pub async fn list_flags(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> ServiceResult<Vec<FlagResponse>> {
        self.authorize(principal, Some(project_id), Requirement::ProjectMember)
            .await?;
        self.project(project_id).await?;
        let flags = self.store.list_flags(project_id).await?;
        let mut items = Vec::with_capacity(flags.len());
        for flag in flags {
            items.push(self.flag_response(flag).await?);
        }
        Ok(items)
    }

    pub async fn get_flag(
        &self,
        principal: &Principal,
        project_id: Uuid,
        flag_id: Uuid,
    ) -> ServiceResult<FlagResponse> {
        self.authorize(principal, Some(project_id), Requirement::ProjectMember)
            .await?;
        let flag = self.project_flag(project_id, flag_id).await?;
        self.flag_response(flag).await
    }

    /// Creates the flag with one disabled value per existing scope.
    pub async fn create_flag(
        &self,
        principal: &Principal,
        project_id: Uuid,
        request: CreateFlagRequest,
    ) -> ServiceResult<FlagResponse> {
        self.authorize(principal, Some(project_id), MANAGE_FLAGS)
            .await?;
        let project = self.project(project_id).await?;
        Validator::default()
            .flag_key("key", &request.key)
            .name("name", &request.name)
            .finish()?;
        let name = request.name.trim().to_string();
        self.ensure_flag_unique(project_id, None, &request.key, &name)
            .await?;
        let now = Utc::now();
        let flag = self
            .store
            .create_flag(Flag {
                id: Uuid::new_v4(),
                project_id,
                key: request.key,
                name,
                description: request.description,
                created_at: now,
                updated_at: now,
            })
            .await?;
        audit(&principal.username, &project.alias, "flag", "create");
        self.flag_response(flag).await
    }

    pub async fn update_flag(
        &self,
        principal: &Principal,
        project_id: Uuid,
        flag_id: Uuid,
        request: UpdateFlagRequest,
    ) -> ServiceResult<FlagResponse> {
        self.authorize(principal, Some(project_id), MANAGE_FLAGS)
            .await?;
        let project = self.project(project_id).await?;
        let mut flag = self.project_flag(project_id, flag_id).await?;
        let mut validator = Validator::default();
        if let Some(key) = &request.key {
            validator.flag_key("key", key);
        }
        if let Some(name) = &request.name {
            validator.name("name", name);
        }
        validator.finish()?;

        let old_key = flag.key.clone();
        if let Some(key) = request.key {
            flag.key = key;
        }
        if let Some(name) = request.name {
            flag.name = name.trim().to_string();
        }
        if request.description.is_some() {
            flag.description = request.description;
        }
        self.ensure_flag_unique(project_id, Some(flag.id), &flag.key, &flag.name)
            .await?;
        flag.updated_at = Utc::now();
        let flag = self.store.update_flag(flag).await?;

        if flag.key != old_key {
            self.invalidate(&[CacheTag::ProjectFlag(project.alias.clone(), old_key)])
                .await;
        }
        audit(&principal.username, &project.alias, "flag", "update");
        self.flag_response(flag).await
    }

    pub async fn delete_flag(
        &self,
        principal: &Principal,
        project_id: Uuid,
        flag_id: Uuid,
    ) -> ServiceResult<()> {
        self.authorize(principal, Some(project_id), MANAGE_FLAGS)
            .await?;
        let project = self.project(project_id).await?;
        let flag = self.project_flag(project_id, flag_id).await?;
        self.store.delete_flag(flag.id).await?;
        self.invalidate(&[CacheTag::ProjectFlag(project.alias.clone(), flag.key)])
            .await;
        audit(&principal.username, &project.alias, "flag", "delete");
        Ok(())
    }

    /// Sets one flag in one scope. Gated by the scope grant, not a project grant.
    pub async fn update_flag_value(
        &self,
        principal: &Principal,
        project_id: Uuid,
        flag_id: Uuid,
        scope_id: Uuid,
        enabled: bool,
    ) -> ServiceResult<FlagValue> {
        self.authorize(
            principal,
            Some(scope_id),
            Requirement::Scope(ScopePermission::UpdateFeatureFlags),
        )
        .await?;
        let project = self.project(project_id).await?;
        let flag = self.project_flag(project_id, flag_id).await?;
        let scope = self.store.get_scope(scope_id).await?;
        if scope.project_id != flag.project_id {
            return Err(ServiceError::BadRequest(
                "scope does not belong to the flag's project".to_string(),
            ));
        }
        let value = self
            .store
            .set_flag_value(FlagValue {
                flag_id: flag.id,
                scope_id: scope.id,
                enabled,
                updated_at: Utc::now(),
            })
            .await?;
        self.cache
            .invalidate_key(&FlagCacheKey::new(&project.alias, &scope.alias, &flag.key))
            .await;
        tracing::info!(
            user_id = %principal.user_id,
            project_id = %project.id,
            flag_key = %flag.key,
            scope = %scope.alias,
            enabled,
            "flag value updated"
        );
        audit(&principal.username, &project.alias, "flag_value", "update");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::types::InviteMemberRequest;
    use crate::model::ScopeGrant;
    use crate::service::testing::{Harness, harness};
    use flagplane_authz::GlobalRole;

    fn new_flag(key: &str) -> CreateFlagRequest {
        CreateFlagRequest {
            key: key.into(),
            name: key.to_uppercase(),
            description: None,
        }
    }

    async fn member_with(h: &Harness, owner: &Principal, project_id: Uuid, grants: Vec<ScopeGrant>) -> Principal {
        let member = h.user("member", GlobalRole::User).await;
        h.services
            .invite_member(
                owner,
                project_id,
                InviteMemberRequest {
                    user_id: member.user_id,
                    project_permissions: vec![],
                    scope_permissions: grants,
                },
            )
            .await
            .expect("invite");
        member
    }

    #[tokio::test]
    async fn create_seeds_one_disabled_value_per_scope() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let flag = h
            .services
            .create_flag(&owner, project.id, new_flag("checkout"))
            .await
            .expect("flag");
        assert_eq!(flag.values.len(), 3);
        assert!(flag.values.iter().all(|value| !value.enabled));
    }

    #[tokio::test]
    async fn duplicate_key_or_name_is_rejected() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        h.services
            .create_flag(&owner, project.id, new_flag("checkout"))
            .await
            .expect("flag");
        let err = h
            .services
            .create_flag(&owner, project.id, new_flag("checkout"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ServiceError::BadRequest(_)));
        let err = h
            .services
            .create_flag(
                &owner,
                project.id,
                CreateFlagRequest {
                    key: "other".into(),
                    name: "CHECKOUT".into(),
                    description: None,
                },
            )
            .await
            .expect_err("duplicate name");
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn value_update_requires_scope_grant() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let dev = h.scope(&project, "dev").await;
        let prod = h.scope(&project, "production").await;
        let flag = h
            .services
            .create_flag(&owner, project.id, new_flag("checkout"))
            .await
            .expect("flag");

        // Project-level grants do not reach scope values.
        let err = h
            .services
            .update_flag_value(&owner, project.id, flag.flag.id, dev.id, true)
            .await
            .expect_err("owner lacks scope grant");
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let member = member_with(
            &h,
            &owner,
            project.id,
            vec![ScopeGrant {
                scope_id: dev.id,
                permission: ScopePermission::UpdateFeatureFlags,
            }],
        )
        .await;
        let value = h
            .services
            .update_flag_value(&member, project.id, flag.flag.id, dev.id, true)
            .await
            .expect("update");
        assert!(value.enabled);
        let err = h
            .services
            .update_flag_value(&member, project.id, flag.flag.id, prod.id, true)
            .await
            .expect_err("no prod grant");
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn cross_project_scope_is_bad_request() {
        let h = harness();
        let admin = h.user("root", GlobalRole::Admin).await;
        let acme = h.project(&admin, "acme").await;
        let globex = h.project(&admin, "globex").await;
        let foreign = h.scope(&globex, "dev").await;
        let flag = h
            .services
            .create_flag(&admin, acme.id, new_flag("checkout"))
            .await
            .expect("flag");
        let err = h
            .services
            .update_flag_value(&admin, acme.id, flag.flag.id, foreign.id, true)
            .await
            .expect_err("cross project");
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn rename_checks_key_and_keeps_values() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let first = h
            .services
            .create_flag(&owner, project.id, new_flag("checkout"))
            .await
            .expect("flag");
        h.services
            .create_flag(&owner, project.id, new_flag("search"))
            .await
            .expect("flag");
        let err = h
            .services
            .update_flag(
                &owner,
                project.id,
                first.flag.id,
                UpdateFlagRequest {
                    key: Some("search".into()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("taken");
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let renamed = h
            .services
            .update_flag(
                &owner,
                project.id,
                first.flag.id,
                UpdateFlagRequest {
                    key: Some("checkout-v2".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("rename");
        assert_eq!(renamed.flag.key, "checkout-v2");
        assert_eq!(renamed.values.len(), 3);

        h.services
            .delete_flag(&owner, project.id, first.flag.id)
            .await
            .expect("delete");
        assert!(matches!(
            h.services.get_flag(&owner, project.id, first.flag.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
