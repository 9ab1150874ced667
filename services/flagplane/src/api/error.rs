//! API error types and helpers.
//!
//! # Purpose
//! Keeps error bodies uniform across endpoints and maps [`ServiceError`]
//! onto HTTP statuses.
//!
//! # Security
//! - Internal errors log details server-side but return generic messages.
//! - Credential failures carry a fixed message so callers cannot tell which
//!   factor was wrong.
use crate::api::types::ErrorResponse;
use crate::service::{FieldError, ServiceError};
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            details: Vec::new(),
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn api_bad_request(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

/// Caller supplies the conflict code for precise client handling.
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// Logs the store error and returns a generic 500.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "flagplane storage error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn api_validation_error(message: &str, details: Vec<FieldError>) -> ApiError {
    let mut err = api_error(StatusCode::BAD_REQUEST, "validation_error", message);
    err.body.details = details;
    err
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => api_not_found(&message),
            ServiceError::Forbidden(message) => api_forbidden(&message),
            ServiceError::Unauthorized(message) => api_unauthorized(&message),
            ServiceError::BadRequest(message) => api_bad_request(&message),
            ServiceError::Conflict(message) => api_conflict("conflict", &message),
            ServiceError::Validation(details) => {
                api_validation_error("request validation failed", details)
            }
            ServiceError::Store(err) => api_internal("storage error", &err),
            ServiceError::Internal(err) => {
                tracing::error!(error = ?err, "flagplane internal error");
                api_internal_message("internal error")
            }
        }
    }
}
