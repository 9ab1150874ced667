//! Project memberships and the grants attached to them.
use chrono::{DateTime, Utc};
use flagplane_authz::{ProjectPermission, ScopePermission};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use utoipa::ToSchema;
use uuid::Uuid;

/// Existence of a membership row is what makes a user a project member.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Membership {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
pub struct ScopeGrant {
    pub scope_id: Uuid,
    pub permission: ScopePermission,
}

/// Full permission picture of one member in one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MemberPermissions {
    pub project_permissions: BTreeSet<ProjectPermission>,
    pub scope_permissions: BTreeMap<Uuid, BTreeSet<ScopePermission>>,
}

impl MemberPermissions {
    pub fn scope_grants(&self) -> Vec<ScopeGrant> {
        self.scope_permissions
            .iter()
            .flat_map(|(scope_id, perms)| {
                perms.iter().map(move |permission| ScopeGrant {
                    scope_id: *scope_id,
                    permission: *permission,
                })
            })
            .collect()
    }
}
