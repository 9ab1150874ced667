//! Machine credentials (project API keys).
//!
//! # Purpose
//! Resolves SDK callers from a project API key. Two shapes are supported and
//! each is bound to one endpoint family:
//! - three-factor: `X-API-Key` + `x-project-alias` + `x-scope-alias` headers,
//!   used by the legacy `GET /sdk/v1/features` read;
//! - bearer: `Authorization: Bearer <key>` resolving the owning project, with
//!   the scope taken from the evaluation request body.
//!
//! # Key invariants
//! - Both shapes fail closed. A missing header, an unknown project, a wrong key,
//!   and an unknown scope are indistinguishable to the caller.
//! - Keys are compared through SHA-256 digests so comparison time does not
//!   depend on how many leading bytes match.
use crate::model::Project;
use crate::store::{CatalogStore, FlagplaneStore, StoreResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const PROJECT_ALIAS_HEADER: &str = "x-project-alias";
pub const SCOPE_ALIAS_HEADER: &str = "x-scope-alias";

/// 32 random bytes, base64url without padding.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn keys_match(presented: &str, stored: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(stored.as_bytes())
}

#[derive(Clone)]
pub struct ApiKeyValidator {
    store: Arc<dyn FlagplaneStore>,
}

impl ApiKeyValidator {
    pub fn new(store: Arc<dyn FlagplaneStore>) -> Self {
        Self { store }
    }

    /// True only if the key belongs to the aliased project and the aliased
    /// scope exists under it.
    pub async fn validate_api_key(
        &self,
        project_alias: &str,
        api_key: &str,
        scope_alias: &str,
    ) -> StoreResult<bool> {
        let Some(project) = self.store.find_project_by_alias(project_alias).await? else {
            return Ok(false);
        };
        if !keys_match(api_key, &project.api_key) {
            return Ok(false);
        }
        Ok(self
            .store
            .find_scope_by_alias(project.id, scope_alias)
            .await?
            .is_some())
    }

    /// Resolves the project owning `api_key`.
    pub async fn validate_api_key_and_get_project(
        &self,
        api_key: &str,
    ) -> StoreResult<Option<Project>> {
        if api_key.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .find_project_by_api_key(api_key)
            .await?
            .filter(|project| keys_match(api_key, &project.api_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scope;
    use crate::store::memory::InMemoryStore;
    use crate::store::{CatalogStore, NewProject};
    use chrono::Utc;
    use uuid::Uuid;

    async fn seeded() -> (ApiKeyValidator, Project) {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            alias: "acme".to_string(),
            name: "Acme".to_string(),
            description: None,
            api_key: generate_api_key(),
            is_archived: false,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        let scope = Scope {
            id: Uuid::new_v4(),
            project_id: project.id,
            alias: "dev".to_string(),
            name: "Development".to_string(),
            description: None,
            index: 0,
            created_at: now,
        };
        store
            .create_project(NewProject {
                project: project.clone(),
                scopes: vec![scope],
                owner_permissions: vec![],
            })
            .await
            .expect("project");
        (ApiKeyValidator::new(store), project)
    }

    #[test]
    fn generated_keys_are_unpadded_and_unique() {
        let first = generate_api_key();
        assert_eq!(first.len(), 43);
        assert!(!first.contains('='));
        assert_ne!(first, generate_api_key());
    }

    #[tokio::test]
    async fn three_factor_requires_all_factors() {
        let (validator, project) = seeded().await;
        let key = project.api_key.as_str();
        assert!(validator.validate_api_key("acme", key, "dev").await.expect("ok"));
        assert!(!validator.validate_api_key("acme", "wrong", "dev").await.expect("ok"));
        assert!(!validator.validate_api_key("other", key, "dev").await.expect("ok"));
        assert!(!validator.validate_api_key("acme", key, "prod").await.expect("ok"));
    }

    #[tokio::test]
    async fn bearer_resolves_owning_project() {
        let (validator, project) = seeded().await;
        let resolved = validator
            .validate_api_key_and_get_project(&project.api_key)
            .await
            .expect("ok")
            .expect("project");
        assert_eq!(resolved.id, project.id);
        assert!(validator
            .validate_api_key_and_get_project("nope")
            .await
            .expect("ok")
            .is_none());
        assert!(validator
            .validate_api_key_and_get_project("")
            .await
            .expect("ok")
            .is_none());
    }
}
