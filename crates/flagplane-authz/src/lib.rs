//! Permission vocabulary shared by flagplane services.
//!
//! # Purpose
//! Defines the closed sets of project permissions, scope permissions, and
//! global roles that the permission store persists and the permission engine
//! evaluates.
//!
//! # Key invariants
//! - Every permission has exactly one canonical snake-case string form; the
//!   string form is what storage and the HTTP API carry.
//! - Project permissions never imply scope permissions and vice versa.
//!
//! # Examples
//! ```rust
//! use flagplane_authz::{ProjectPermission, ScopePermission};
//!
//! assert_eq!(ProjectPermission::ManageUsers.as_str(), "manage_users");
//! assert_eq!(
//!     "update_feature_flags".parse::<ScopePermission>().ok(),
//!     Some(ScopePermission::UpdateFeatureFlags)
//! );
//! ```

mod errors;
mod permission;
mod role;

pub use errors::{AuthzError, AuthzResult};
pub use permission::{ProjectPermission, ScopePermission};
pub use role::GlobalRole;
