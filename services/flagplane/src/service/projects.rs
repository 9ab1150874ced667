//! Project use-cases.
use super::error::Validator;
use super::{ServiceError, ServiceResult, Services};
use crate::service::types::{
    ApiKeyResponse, CreateProjectRequest, PermissionsResponse, ProjectDetailResponse,
    ProjectResponse, UpdateProjectRequest,
};
use crate::auth::api_key::generate_api_key;
use crate::auth::principal::Principal;
use crate::authz::Requirement;
use crate::cache::CacheTag;
use crate::model::{DEFAULT_SCOPES, Project, Scope};
use crate::observability::audit;
use crate::store::{CatalogStore, NewProject};
use chrono::Utc;
use flagplane_authz::ProjectPermission;
use uuid::Uuid;

impl Services {
    /// Any authenticated user may create a project and becomes its owner
    /// with every project permission.
    pub async fn create_project(
        &self,
        principal: &Principal,
        request: CreateProjectRequest,
    ) -> ServiceResult<ProjectDetailResponse> {
        Validator::default()
            .alias("alias", &request.alias)
            .name("name", &request.name)
            .finish()?;
        if self.store.find_project_by_alias(&request.alias).await?.is_some() {
            return Err(ServiceError::BadRequest(format!(
                "project alias '{}' already exists",
                request.alias
            )));
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            alias: request.alias,
            name: request.name.trim().to_string(),
            description: request.description,
            api_key: generate_api_key(),
            is_archived: false,
            created_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        let scopes: Vec<Scope> = DEFAULT_SCOPES
            .iter()
            .enumerate()
            .map(|(index, (alias, name))| Scope {
                id: Uuid::new_v4(),
                project_id: project.id,
                alias: alias.to_string(),
                name: name.to_string(),
                description: None,
                index: index as i32,
                created_at: now,
            })
            .collect();
        let project = self
            .store
            .create_project(NewProject {
                project,
                scopes: scopes.clone(),
                owner_permissions: ProjectPermission::ALL.to_vec(),
            })
            .await?;
        audit(&principal.username, &project.alias, "project", "create");
        Ok(ProjectDetailResponse {
            project: ProjectResponse::new(project, true),
            scopes,
        })
    }

    /// Admins see every project; everyone else sees their memberships.
    pub async fn list_projects(
        &self,
        principal: &Principal,
        include_archived: bool,
    ) -> ServiceResult<Vec<ProjectResponse>> {
        let projects = if self.engine().is_admin(principal.user_id).await? {
            self.store.list_projects(include_archived).await?
        } else {
            self.store
                .list_projects_for_user(principal.user_id, include_archived)
                .await?
        };
        Ok(projects
            .into_iter()
            .map(|project| ProjectResponse::new(project, false))
            .collect())
    }

    pub async fn get_project(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> ServiceResult<ProjectDetailResponse> {
        self.authorize(principal, Some(project_id), Requirement::ProjectMember)
            .await?;
        let project = self.project(project_id).await?;
        let reveal = self
            .engine()
            .has_project_permission(principal.user_id, project_id, ProjectPermission::ViewApiKey)
            .await?;
        let scopes = self.store.list_scopes(project_id).await?;
        Ok(ProjectDetailResponse {
            project: ProjectResponse::new(project, reveal),
            scopes,
        })
    }

    pub async fn update_project(
        &self,
        principal: &Principal,
        project_id: Uuid,
        request: UpdateProjectRequest,
    ) -> ServiceResult<ProjectResponse> {
        self.authorize(
            principal,
            Some(project_id),
            Requirement::Project(ProjectPermission::ManageProjectSettings),
        )
        .await?;
        let mut project = self.project(project_id).await?;
        let mut validator = Validator::default();
        if let Some(alias) = &request.alias {
            validator.alias("alias", alias);
        }
        if let Some(name) = &request.name {
            validator.name("name", name);
        }
        validator.finish()?;

        let old_alias = project.alias.clone();
        if let Some(alias) = request.alias
            && alias != project.alias
        {
            if self.store.find_project_by_alias(&alias).await?.is_some() {
                return Err(ServiceError::BadRequest(format!(
                    "project alias '{alias}' already exists"
                )));
            }
            project.alias = alias;
        }
        if let Some(name) = request.name {
            project.name = name.trim().to_string();
        }
        if request.description.is_some() {
            project.description = request.description;
        }
        project.updated_at = Utc::now();
        let project = self.store.update_project(project).await?;

        if project.alias != old_alias {
            self.invalidate(&[CacheTag::Project(old_alias)]).await;
        }
        audit(&principal.username, &project.alias, "project", "update");
        Ok(ProjectResponse::new(project, false))
    }

    pub async fn delete_project(&self, principal: &Principal, project_id: Uuid) -> ServiceResult<()> {
        self.authorize(
            principal,
            Some(project_id),
            Requirement::Project(ProjectPermission::DeleteProject),
        )
        .await?;
        let project = self.project(project_id).await?;
        self.store.delete_project(project_id).await?;
        self.invalidate(&[CacheTag::Project(project.alias.clone())])
            .await;
        audit(&principal.username, &project.alias, "project", "delete");
        Ok(())
    }

    pub async fn regenerate_api_key(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> ServiceResult<ApiKeyResponse> {
        self.authorize(
            principal,
            Some(project_id),
            Requirement::Project(ProjectPermission::RegenerateApiKey),
        )
        .await?;
        let mut project = self.project(project_id).await?;
        project.api_key = generate_api_key();
        project.updated_at = Utc::now();
        let project = self.store.update_project(project).await?;
        self.invalidate(&[CacheTag::Project(project.alias.clone())])
            .await;
        audit(&principal.username, &project.alias, "project", "regenerate_api_key");
        Ok(ApiKeyResponse {
            api_key: project.api_key,
        })
    }

    pub async fn set_project_archived(
        &self,
        principal: &Principal,
        project_id: Uuid,
        archived: bool,
    ) -> ServiceResult<ProjectResponse> {
        self.authorize(
            principal,
            Some(project_id),
            Requirement::Project(ProjectPermission::ManageProjectSettings),
        )
        .await?;
        let mut project = self.project(project_id).await?;
        if project.is_archived == archived {
            let state = if archived { "archived" } else { "not archived" };
            return Err(ServiceError::BadRequest(format!("project is already {state}")));
        }
        project.is_archived = archived;
        project.updated_at = Utc::now();
        let project = self.store.update_project(project).await?;
        let action = if archived { "archive" } else { "unarchive" };
        audit(&principal.username, &project.alias, "project", action);
        Ok(ProjectResponse::new(project, false))
    }

    pub async fn my_permissions(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> ServiceResult<PermissionsResponse> {
        self.authorize(principal, Some(project_id), Requirement::ProjectMember)
            .await?;
        let engine = self.engine();
        Ok(PermissionsResponse {
            project_permissions: engine
                .list_project_permissions(principal.user_id, project_id)
                .await?,
            scope_permissions: engine
                .list_scope_permissions(principal.user_id, project_id)
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::harness;
    use crate::store::{CatalogStore, PermissionStore};
    use flagplane_authz::GlobalRole;

    #[tokio::test]
    async fn creator_gets_every_grant_and_default_scopes() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let detail = h
            .services
            .create_project(
                &owner,
                CreateProjectRequest {
                    alias: "acme".into(),
                    name: "Acme".into(),
                    description: None,
                },
            )
            .await
            .expect("create");
        assert!(detail.project.api_key.is_some());
        let aliases: Vec<_> = detail.scopes.iter().map(|s| (s.alias.as_str(), s.index)).collect();
        assert_eq!(aliases, vec![("dev", 0), ("staging", 1), ("production", 2)]);
        let granted = h
            .store
            .list_project_permissions(owner.user_id, detail.project.id)
            .await
            .expect("grants");
        assert_eq!(granted.len(), ProjectPermission::ALL.len());
    }

    #[tokio::test]
    async fn duplicate_alias_is_bad_request() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        h.project(&owner, "acme").await;
        let err = h
            .services
            .create_project(
                &owner,
                CreateProjectRequest {
                    alias: "acme".into(),
                    name: "Again".into(),
                    description: None,
                },
            )
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn invalid_input_reports_fields() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let err = h
            .services
            .create_project(
                &owner,
                CreateProjectRequest {
                    alias: "Not Valid".into(),
                    name: "".into(),
                    description: None,
                },
            )
            .await
            .expect_err("invalid");
        let ServiceError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 2);
    }

    #[tokio::test]
    async fn api_key_only_revealed_with_view_permission() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let viewer = h.user("viewer", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        h.services
            .invite_member(
                &owner,
                project.id,
                crate::service::types::InviteMemberRequest {
                    user_id: viewer.user_id,
                    project_permissions: vec![],
                    scope_permissions: vec![],
                },
            )
            .await
            .expect("invite");
        let seen = h.services.get_project(&viewer, project.id).await.expect("get");
        assert!(seen.project.api_key.is_none());
        let seen = h.services.get_project(&owner, project.id).await.expect("get");
        assert_eq!(seen.project.api_key.as_deref(), Some(project.api_key.as_str()));
    }

    #[tokio::test]
    async fn outsiders_are_forbidden() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let outsider = h.user("outsider", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let err = h
            .services
            .get_project(&outsider, project.id)
            .await
            .expect_err("forbidden");
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = h
            .services
            .delete_project(&outsider, project.id)
            .await
            .expect_err("forbidden");
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn listing_respects_membership_and_archive_flag() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let other = h.user("other", GlobalRole::User).await;
        let admin = h.user("root", GlobalRole::Admin).await;
        let acme = h.project(&owner, "acme").await;
        h.project(&other, "globex").await;

        let mine = h.services.list_projects(&owner, false).await.expect("list");
        assert_eq!(mine.len(), 1);
        assert!(mine.iter().all(|p| p.api_key.is_none()));
        assert_eq!(h.services.list_projects(&admin, false).await.expect("list").len(), 2);

        h.services
            .set_project_archived(&owner, acme.id, true)
            .await
            .expect("archive");
        assert!(h.services.list_projects(&owner, false).await.expect("list").is_empty());
        assert_eq!(h.services.list_projects(&owner, true).await.expect("list").len(), 1);

        let err = h
            .services
            .set_project_archived(&owner, acme.id, true)
            .await
            .expect_err("already archived");
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn rename_rechecks_alias() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let acme = h.project(&owner, "acme").await;
        h.project(&owner, "globex").await;
        let err = h
            .services
            .update_project(
                &owner,
                acme.id,
                UpdateProjectRequest {
                    alias: Some("globex".into()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("taken");
        assert!(matches!(err, ServiceError::BadRequest(_)));
        let renamed = h
            .services
            .update_project(
                &owner,
                acme.id,
                UpdateProjectRequest {
                    alias: Some("acme-corp".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("rename");
        assert_eq!(renamed.alias, "acme-corp");
    }

    #[tokio::test]
    async fn regenerate_changes_key_and_delete_removes_project() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let acme = h.project(&owner, "acme").await;
        let rotated = h
            .services
            .regenerate_api_key(&owner, acme.id)
            .await
            .expect("rotate");
        assert_ne!(rotated.api_key, acme.api_key);
        h.services.delete_project(&owner, acme.id).await.expect("delete");
        assert!(h.store.get_project(acme.id).await.is_err());
    }

    #[tokio::test]
    async fn my_permissions_require_membership() {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let outsider = h.user("outsider", GlobalRole::User).await;
        let acme = h.project(&owner, "acme").await;
        let mine = h.services.my_permissions(&owner, acme.id).await.expect("perms");
        assert_eq!(mine.project_permissions.len(), ProjectPermission::ALL.len());
        assert!(mine.scope_permissions.is_empty());
        assert!(matches!(
            h.services.my_permissions(&outsider, acme.id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
