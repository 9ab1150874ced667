use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("invalid project permission: {0}")]
    InvalidProjectPermission(String),
    #[error("invalid scope permission: {0}")]
    InvalidScopePermission(String),
    #[error("invalid global role: {0}")]
    InvalidRole(String),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
