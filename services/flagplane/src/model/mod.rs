//! Flagplane data model.
//!
//! # Purpose
//! Re-exports the user, project, scope, flag, and membership records shared
//! by the store, service, and HTTP layers.
mod flag;
mod membership;
mod project;
mod scope;
mod user;

pub use flag::{Flag, FlagValue, FlagValueRecord};
pub use membership::{MemberPermissions, Membership, ScopeGrant};
pub use project::Project;
pub use scope::{DEFAULT_SCOPES, Scope};
pub use user::User;
