//! Authorization: the permission engine and the per-request gateway in front of it.
pub mod engine;
pub mod gateway;

pub use engine::PermissionEngine;
pub use gateway::{AuthorizationGateway, Decision, DenyReason, Requirement};
