//! Feature flags and their per-scope values.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Flag {
    pub id: Uuid,
    pub project_id: Uuid,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// State of one flag in one scope. Unique per `(flag_id, scope_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct FlagValue {
    pub flag_id: Uuid,
    pub scope_id: Uuid,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// A flag value resolved by `(project alias, scope alias, flag key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagValueRecord {
    pub flag_key: String,
    pub scope_id: Uuid,
    pub scope_alias: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}
