//! Scope (deployment environment) records.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Scopes seeded into every new project as `(alias, name)`, in index order.
pub const DEFAULT_SCOPES: [(&str, &str); 3] = [
    ("dev", "Development"),
    ("staging", "Staging"),
    ("production", "Production"),
];

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Scope {
    pub id: Uuid,
    pub project_id: Uuid,
    pub alias: String,
    pub name: String,
    pub description: Option<String>,
    /// Creation order within the project; listings sort on it.
    pub index: i32,
    pub created_at: DateTime<Utc>,
}
