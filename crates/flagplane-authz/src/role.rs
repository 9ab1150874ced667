use crate::errors::AuthzError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Service-wide role of a user. `Admin` bypasses every project and scope check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    #[default]
    User,
    Admin,
}

impl GlobalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalRole::User => "user",
            GlobalRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GlobalRole {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(GlobalRole::User),
            "admin" => Ok(GlobalRole::Admin),
            _ => Err(AuthzError::InvalidRole(value.to_string())),
        }
    }
}
