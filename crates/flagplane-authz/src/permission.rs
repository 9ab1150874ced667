use crate::errors::AuthzError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission granted on a whole project through a membership.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPermission {
    ManageUsers,
    ManageFeatureFlags,
    ManageScopes,
    ViewApiKey,
    RegenerateApiKey,
    ManageProjectSettings,
    DeleteProject,
}

impl ProjectPermission {
    pub const ALL: [ProjectPermission; 7] = [
        ProjectPermission::ManageUsers,
        ProjectPermission::ManageFeatureFlags,
        ProjectPermission::ManageScopes,
        ProjectPermission::ViewApiKey,
        ProjectPermission::RegenerateApiKey,
        ProjectPermission::ManageProjectSettings,
        ProjectPermission::DeleteProject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectPermission::ManageUsers => "manage_users",
            ProjectPermission::ManageFeatureFlags => "manage_feature_flags",
            ProjectPermission::ManageScopes => "manage_scopes",
            ProjectPermission::ViewApiKey => "view_api_key",
            ProjectPermission::RegenerateApiKey => "regenerate_api_key",
            ProjectPermission::ManageProjectSettings => "manage_project_settings",
            ProjectPermission::DeleteProject => "delete_project",
        }
    }

    /// Permissions a project must always keep at least one holder of.
    pub fn is_guarded(self) -> bool {
        matches!(
            self,
            ProjectPermission::ManageUsers | ProjectPermission::DeleteProject
        )
    }
}

impl std::fmt::Display for ProjectPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectPermission {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ProjectPermission::ALL
            .into_iter()
            .find(|perm| perm.as_str() == value)
            .ok_or_else(|| AuthzError::InvalidProjectPermission(value.to_string()))
    }
}

/// Permission granted on one scope of a project through a membership.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ScopePermission {
    ReadFeatureFlags,
    UpdateFeatureFlags,
}

impl ScopePermission {
    pub const ALL: [ScopePermission; 2] = [
        ScopePermission::ReadFeatureFlags,
        ScopePermission::UpdateFeatureFlags,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScopePermission::ReadFeatureFlags => "read_feature_flags",
            ScopePermission::UpdateFeatureFlags => "update_feature_flags",
        }
    }
}

impl std::fmt::Display for ScopePermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopePermission {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ScopePermission::ALL
            .into_iter()
            .find(|perm| perm.as_str() == value)
            .ok_or_else(|| AuthzError::InvalidScopePermission(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_permission_string_roundtrip() {
        for perm in ProjectPermission::ALL {
            let as_str = perm.as_str();
            assert_eq!(as_str.parse::<ProjectPermission>().ok(), Some(perm));
            assert_eq!(perm.to_string(), as_str);
        }
    }

    #[test]
    fn scope_permission_string_roundtrip() {
        for perm in ScopePermission::ALL {
            let as_str = perm.as_str();
            assert_eq!(as_str.parse::<ScopePermission>().ok(), Some(perm));
            assert_eq!(perm.to_string(), as_str);
        }
    }

    #[test]
    fn unknown_permission_strings_are_rejected() {
        assert_eq!(
            "manage_everything".parse::<ProjectPermission>(),
            Err(AuthzError::InvalidProjectPermission(
                "manage_everything".to_string()
            ))
        );
        assert!("read_feature_flags".parse::<ProjectPermission>().is_err());
        assert!("manage_users".parse::<ScopePermission>().is_err());
    }

    #[test]
    fn only_user_management_and_deletion_are_guarded() {
        let guarded: Vec<_> = ProjectPermission::ALL
            .into_iter()
            .filter(|perm| perm.is_guarded())
            .collect();
        assert_eq!(
            guarded,
            vec![ProjectPermission::ManageUsers, ProjectPermission::DeleteProject]
        );
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ProjectPermission::ViewApiKey).expect("serialize");
        assert_eq!(json, "\"view_api_key\"");
        let parsed: ScopePermission =
            serde_json::from_str("\"read_feature_flags\"").expect("deserialize");
        assert_eq!(parsed, ScopePermission::ReadFeatureFlags);
    }
}
