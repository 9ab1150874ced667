use crate::auth::password::HashError;
use crate::auth::session::TokenError;
use crate::cache::CacheError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(format!("{what} not found"))
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => ServiceError::NotFound(format!("{what} not found")),
            StoreError::Conflict(message) => ServiceError::Conflict(message),
            StoreError::LastHolder(permission) => ServiceError::BadRequest(format!(
                "cannot remove {permission}: no other active member holds it"
            )),
            other => ServiceError::Store(other),
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(value: CacheError) -> Self {
        ServiceError::Internal(anyhow::Error::new(value))
    }
}

impl From<HashError> for ServiceError {
    fn from(value: HashError) -> Self {
        ServiceError::Internal(anyhow::Error::new(value))
    }
}

impl From<TokenError> for ServiceError {
    fn from(value: TokenError) -> Self {
        ServiceError::Internal(anyhow::Error::new(value))
    }
}

/// Collects field errors and fails once at the end.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn alias(&mut self, field: &str, value: &str) -> &mut Self {
        let ok = !value.is_empty()
            && value.len() <= 64
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        self.check(
            ok,
            field,
            "must be 1-64 characters of lowercase letters, digits, '-' or '_'",
        )
    }

    pub fn flag_key(&mut self, field: &str, value: &str) -> &mut Self {
        let ok = !value.is_empty()
            && value.len() <= 128
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        self.check(
            ok,
            field,
            "must be 1-128 characters of letters, digits, '-', '_' or '.'",
        )
    }

    pub fn name(&mut self, field: &str, value: &str) -> &mut Self {
        let trimmed = value.trim();
        self.check(
            !trimmed.is_empty() && trimmed.len() <= 200,
            field,
            "must be 1-200 characters",
        )
    }

    pub fn finish(&mut self) -> ServiceResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}
