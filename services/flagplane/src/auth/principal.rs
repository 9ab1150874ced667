//! The acting principal of a request.
//!
//! Transport adapters resolve a [`Principal`] once per request and pass it by
//! reference into every service call. Nothing in the core reads identity from
//! ambient context.
use crate::auth::session::SessionClaims;
use crate::model::User;
use flagplane_authz::GlobalRole;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    /// Role at login time. Authorization re-reads the live role.
    pub role: GlobalRole,
}

impl From<SessionClaims> for Principal {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            display_name: claims.name,
            role: claims.role,
        }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            display_name: user.full_name.clone(),
            role: user.role,
        }
    }
}
