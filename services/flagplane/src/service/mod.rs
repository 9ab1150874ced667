//! Use-cases behind the HTTP surface.
//!
//! # Purpose
//! Every operation takes the acting [`Principal`] explicitly, asks the
//! authorization gateway before touching data, and invalidates evaluation
//! cache tags after its write commits.
//!
//! # Key invariants
//! - Authorization precedes the guarded read or write.
//! - Cache invalidation happens after the store acknowledges the write and
//!   before the operation returns.
//! - Invariant refusals (last holder, self-revocation, cross-project scope)
//!   are raised before any mutation is applied.
pub mod auth;
pub mod error;
pub mod evaluation;
pub mod flags;
pub mod members;
pub mod projects;
pub mod scopes;
pub mod types;
pub mod users;

use crate::auth::api_key::ApiKeyValidator;
use crate::auth::password::{BlockingHasher, PasswordHasher};
use crate::auth::principal::Principal;
use crate::auth::session::SessionSigner;
use crate::authz::{AuthorizationGateway, Decision, DenyReason, PermissionEngine, Requirement};
use crate::cache::{CacheTag, EvaluationCache};
use crate::model::{Flag, Project, Scope};
use crate::store::{CatalogStore, FlagplaneStore};
pub use error::{FieldError, ServiceError, ServiceResult};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn FlagplaneStore>,
    pub gateway: AuthorizationGateway,
    pub cache: Arc<dyn EvaluationCache>,
    pub hasher: BlockingHasher,
    pub signer: SessionSigner,
    pub api_keys: ApiKeyValidator,
}

impl Services {
    pub fn new(
        store: Arc<dyn FlagplaneStore>,
        cache: Arc<dyn EvaluationCache>,
        hasher: Arc<dyn PasswordHasher>,
        signer: SessionSigner,
    ) -> Self {
        Self {
            gateway: AuthorizationGateway::new(PermissionEngine::new(store.clone())),
            api_keys: ApiKeyValidator::new(store.clone()),
            store,
            cache,
            hasher: BlockingHasher::new(hasher),
            signer,
        }
    }

    pub fn engine(&self) -> &PermissionEngine {
        self.gateway.engine()
    }

    pub(crate) async fn authorize(
        &self,
        principal: &Principal,
        target: Option<Uuid>,
        requirement: Requirement,
    ) -> ServiceResult<()> {
        match self
            .gateway
            .decide(Some(principal), target, requirement)
            .await?
        {
            Decision::Allowed => Ok(()),
            Decision::Denied(DenyReason::NoIdentity) => {
                Err(ServiceError::Unauthorized("authentication required".to_string()))
            }
            Decision::Denied(_) => Err(ServiceError::Forbidden(format!(
                "missing permission: {requirement}"
            ))),
        }
    }

    /// Loads the project and fails with `NotFound` if it is absent.
    pub(crate) async fn project(&self, project_id: Uuid) -> ServiceResult<Project> {
        Ok(self.store.get_project(project_id).await?)
    }

    /// Loads a scope that must belong to `project_id`.
    pub(crate) async fn project_scope(&self, project_id: Uuid, scope_id: Uuid) -> ServiceResult<Scope> {
        let scope = self.store.get_scope(scope_id).await?;
        if scope.project_id != project_id {
            return Err(ServiceError::not_found("scope"));
        }
        Ok(scope)
    }

    /// Loads a flag that must belong to `project_id`.
    pub(crate) async fn project_flag(&self, project_id: Uuid, flag_id: Uuid) -> ServiceResult<Flag> {
        let flag = self.store.get_flag(flag_id).await?;
        if flag.project_id != project_id {
            return Err(ServiceError::not_found("flag"));
        }
        Ok(flag)
    }

    pub(crate) async fn invalidate(&self, tags: &[CacheTag]) {
        self.cache.invalidate_tags(tags).await;
    }
}
