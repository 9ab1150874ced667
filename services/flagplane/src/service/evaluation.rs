//! Flag evaluation for SDK callers.
//!
//! Callers arrive here already resolved by an API-key credential; there is no
//! principal. Single-flag reads go through the evaluation cache, bulk reads
//! go straight to the store.
use super::{ServiceError, ServiceResult, Services};
use crate::service::types::{EvaluateAllResponse, EvaluationContext, FlagEvaluation};
use crate::cache::{CacheError, CachedFlagValue, FlagCacheKey};
use crate::model::{Project, Scope};
use crate::store::CatalogStore;
use futures::FutureExt;
use std::collections::HashMap;

impl Services {
    /// Cached value of `flag_key` in `scope_alias`. `NotFound` when the flag,
    /// the scope, or the value row is missing.
    pub async fn get_flag_value(
        &self,
        project_alias: &str,
        scope_alias: &str,
        flag_key: &str,
    ) -> ServiceResult<CachedFlagValue> {
        let key = FlagCacheKey::new(project_alias, scope_alias, flag_key);
        let tags = key.tags();
        let store = self.store.clone();
        let (project, scope, flag) = (
            project_alias.to_string(),
            scope_alias.to_string(),
            flag_key.to_string(),
        );
        let loader = async move {
            let record = store
                .lookup_flag_value(&project, &scope, &flag)
                .await
                .map_err(|err| CacheError::Load(err.to_string()))?;
            Ok(record.map(|record| CachedFlagValue {
                enabled: record.enabled,
                scope_id: record.scope_id,
                updated_at: record.updated_at,
            }))
        }
        .boxed();
        let value = self.cache.get_or_populate(key, tags, loader).await?;
        metrics::counter!("flagplane_evaluations_total", "kind" => "single").increment(1);
        value.ok_or_else(|| ServiceError::NotFound(format!("feature flag '{flag_key}' not found")))
    }

    async fn context_scope(&self, project: &Project, context: &EvaluationContext) -> ServiceResult<Scope> {
        self.store
            .find_scope_by_alias(project.id, &context.scope)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("scope '{}' not found in project", context.scope))
            })
    }

    pub async fn evaluate_flag(
        &self,
        project: &Project,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> ServiceResult<FlagEvaluation> {
        let scope = self.context_scope(project, context).await?;
        let value = self
            .get_flag_value(&project.alias, &scope.alias, flag_key)
            .await?;
        Ok(FlagEvaluation::new(
            flag_key.to_string(),
            value.enabled,
            &scope,
            value.updated_at,
        ))
    }

    /// Every flag of the project that has a value in the context scope, by key.
    pub async fn evaluate_all(
        &self,
        project: &Project,
        context: &EvaluationContext,
    ) -> ServiceResult<EvaluateAllResponse> {
        let scope = self.context_scope(project, context).await?;
        let values: HashMap<_, _> = self
            .store
            .list_scope_values(scope.id)
            .await?
            .into_iter()
            .map(|value| (value.flag_id, value))
            .collect();
        let mut flags: Vec<FlagEvaluation> = self
            .store
            .list_flags(project.id)
            .await?
            .into_iter()
            .filter_map(|flag| {
                values
                    .get(&flag.id)
                    .map(|value| FlagEvaluation::new(flag.key, value.enabled, &scope, value.updated_at))
            })
            .collect();
        flags.sort_by(|a, b| a.flag_key.cmp(&b.flag_key));
        metrics::counter!("flagplane_evaluations_total", "kind" => "bulk").increment(1);
        Ok(EvaluateAllResponse { flags })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::types::{CreateFlagRequest, InviteMemberRequest, UpdateFlagRequest, UpdateScopeRequest};
    use crate::auth::principal::Principal;
    use crate::model::ScopeGrant;
    use crate::service::testing::{Harness, harness};
    use flagplane_authz::{GlobalRole, ScopePermission};

    struct World {
        h: Harness,
        owner: Principal,
        editor: Principal,
        project: Project,
        dev: Scope,
        flag_id: uuid::Uuid,
    }

    async fn world() -> World {
        let h = harness();
        let owner = h.user("owner", GlobalRole::User).await;
        let editor = h.user("editor", GlobalRole::User).await;
        let project = h.project(&owner, "acme").await;
        let dev = h.scope(&project, "dev").await;
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
        h.services
            .invite_member(
                &owner,
                project.id,
                InviteMemberRequest {
                    user_id: editor.user_id,
                    project_permissions: vec![],
                    scope_permissions: vec![ScopeGrant {
                        scope_id: dev.id,
                        permission: ScopePermission::UpdateFeatureFlags,
                    }],
                },
            )
            .await
            .expect("invite");
        World {
            flag_id: flag.flag.id,
            h,
            owner,
            editor,
            project,
            dev,
        }
    }

    fn dev_context() -> EvaluationContext {
        EvaluationContext {
            scope: "dev".to_string(),
        }
    }

    #[tokio::test]
    async fn own_write_is_visible_on_next_read() {
        let w = world().await;
        let before = w.h.services.get_flag_value("acme", "dev", "checkout").await.expect("read");
        assert!(!before.enabled);
        assert_eq!(w.h.cache.len(), 1);

        w.h.services
            .update_flag_value(&w.editor, w.project.id, w.flag_id, w.dev.id, true)
            .await
            .expect("update");
        let after = w.h.services.get_flag_value("acme", "dev", "checkout").await.expect("read");
        assert!(after.enabled);
    }

    #[tokio::test]
    async fn unknown_flag_or_scope_is_not_found() {
        let w = world().await;
        assert!(matches!(
            w.h.services.get_flag_value("acme", "dev", "missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            w.h.services
                .evaluate_flag(&w.project, "checkout", &EvaluationContext { scope: "qa".into() })
                .await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(w.h.cache.is_empty());
    }

    #[tokio::test]
    async fn flag_rename_evicts_old_key() {
        let w = world().await;
        w.h.services.get_flag_value("acme", "dev", "checkout").await.expect("read");
        w.h.services
            .update_flag(
                &w.owner,
                w.project.id,
                w.flag_id,
                UpdateFlagRequest {
                    key: Some("checkout-v2".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("rename");
        assert!(w.h.cache.is_empty());
        assert!(matches!(
            w.h.services.get_flag_value("acme", "dev", "checkout").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(w.h.services.get_flag_value("acme", "dev", "checkout-v2").await.is_ok());
    }

    #[tokio::test]
    async fn scope_rename_and_project_rename_evict() {
        let w = world().await;
        w.h.services.get_flag_value("acme", "dev", "checkout").await.expect("read");
        w.h.services.get_flag_value("acme", "staging", "checkout").await.expect("read");
        assert_eq!(w.h.cache.len(), 2);

        w.h.services
            .update_scope(
                &w.owner,
                w.project.id,
                w.dev.id,
                UpdateScopeRequest {
                    alias: Some("development".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("rename scope");
        assert_eq!(w.h.cache.len(), 1);

        w.h.services
            .update_project(
                &w.owner,
                w.project.id,
                crate::service::types::UpdateProjectRequest {
                    alias: Some("acme-corp".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("rename project");
        assert!(w.h.cache.is_empty());
        assert!(w.h.services.get_flag_value("acme-corp", "development", "checkout").await.is_ok());
    }

    #[tokio::test]
    async fn flag_and_scope_deletion_evict() {
        let w = world().await;
        w.h.services.get_flag_value("acme", "dev", "checkout").await.expect("read");
        w.h.services
            .delete_scope(&w.owner, w.project.id, w.dev.id)
            .await
            .expect("delete scope");
        assert!(w.h.cache.is_empty());

        w.h.services.get_flag_value("acme", "staging", "checkout").await.expect("read");
        w.h.services
            .delete_flag(&w.owner, w.project.id, w.flag_id)
            .await
            .expect("delete flag");
        assert!(w.h.cache.is_empty());
    }

    #[tokio::test]
    async fn key_rotation_evicts_project_entries() {
        let w = world().await;
        w.h.services.get_flag_value("acme", "dev", "checkout").await.expect("read");
        w.h.services
            .regenerate_api_key(&w.owner, w.project.id)
            .await
            .expect("rotate");
        assert!(w.h.cache.is_empty());
    }

    #[tokio::test]
    async fn evaluations_have_openfeature_shape() {
        let w = world().await;
        w.h.services
            .create_flag(
                &w.owner,
                w.project.id,
                CreateFlagRequest {
                    key: "beta".into(),
                    name: "Beta".into(),
                    description: None,
                },
            )
            .await
            .expect("flag");
        w.h.services
            .update_flag_value(&w.editor, w.project.id, w.flag_id, w.dev.id, true)
            .await
            .expect("update");

        let single = w
            .h
            .services
            .evaluate_flag(&w.project, "checkout", &dev_context())
            .await
            .expect("evaluate");
        assert!(single.value);
        assert_eq!(single.variant, "enabled");
        assert_eq!(single.reason, "STATIC");
        assert_eq!(single.flag_metadata.scope_id, w.dev.id);

        let all = w
            .h
            .services
            .evaluate_all(&w.project, &dev_context())
            .await
            .expect("evaluate all");
        let keys: Vec<_> = all.flags.iter().map(|f| (f.flag_key.as_str(), f.value)).collect();
        assert_eq!(keys, vec![("beta", false), ("checkout", true)]);
    }
}
