//! Evaluation cache.
//!
//! # Purpose
//! Read-through cache in front of flag value lookups. Entries are keyed by
//! `(project alias, scope alias, flag key)` and labelled with coarse tags so
//! a single mutation can evict every entry it affects.
//!
//! # Key invariants
//! - Every entry carries a project tag, a `(project, flag key)` tag, and a
//!   `(project, scope alias)` tag.
//! - Concurrent misses for one key share a single load.
//! - A load runs to completion (or its timeout) even if the request that
//!   started it goes away.
//! - After `invalidate_*` returns, no reader observes a value loaded before
//!   the call.
//! - Misses (`Ok(None)`) and load errors are never cached.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;

pub use memory::InMemoryEvaluationCache;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagCacheKey {
    pub project_alias: String,
    pub scope_alias: String,
    pub flag_key: String,
}

impl FlagCacheKey {
    pub fn new(
        project_alias: impl Into<String>,
        scope_alias: impl Into<String>,
        flag_key: impl Into<String>,
    ) -> Self {
        Self {
            project_alias: project_alias.into(),
            scope_alias: scope_alias.into(),
            flag_key: flag_key.into(),
        }
    }

    /// The tags an entry for this key is indexed under.
    pub fn tags(&self) -> Vec<CacheTag> {
        vec![
            CacheTag::Project(self.project_alias.clone()),
            CacheTag::ProjectFlag(self.project_alias.clone(), self.flag_key.clone()),
            CacheTag::ProjectScope(self.project_alias.clone(), self.scope_alias.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    Project(String),
    ProjectFlag(String, String),
    ProjectScope(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFlagValue {
    pub enabled: bool,
    pub scope_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache load failed: {0}")]
    Load(String),
    #[error("cache load timed out")]
    Timeout,
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Loader handed to [`EvaluationCache::get_or_populate`]. `'static` because
/// it may outlive the calling request.
pub type LoadFuture = BoxFuture<'static, CacheResult<Option<CachedFlagValue>>>;

#[async_trait]
pub trait EvaluationCache: Send + Sync {
    async fn get_or_populate(
        &self,
        key: FlagCacheKey,
        tags: Vec<CacheTag>,
        loader: LoadFuture,
    ) -> CacheResult<Option<CachedFlagValue>>;

    async fn invalidate_tags(&self, tags: &[CacheTag]);

    async fn invalidate_key(&self, key: &FlagCacheKey);
}
