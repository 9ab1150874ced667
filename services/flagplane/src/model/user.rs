//! User records.
use chrono::{DateTime, Utc};
use flagplane_authz::GlobalRole;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub role: GlobalRole,
    pub is_active: bool,
    pub must_change_password: bool,
    /// Argon2 PHC string. Never serialized.
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Only active admins get the global bypass.
    pub fn is_admin(&self) -> bool {
        self.is_active && self.role == GlobalRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: GlobalRole, is_active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".to_string(),
            full_name: "U".to_string(),
            role,
            is_active,
            must_change_password: false,
            password_hash: "secret-hash".to_string(),
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn inactive_admin_is_not_admin() {
        assert!(user(GlobalRole::Admin, true).is_admin());
        assert!(!user(GlobalRole::Admin, false).is_admin());
        assert!(!user(GlobalRole::User, true).is_admin());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let json = serde_json::to_value(user(GlobalRole::User, true)).expect("serialize");
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }
}
