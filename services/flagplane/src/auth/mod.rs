//! Credential resolution for HTTP callers.
//!
//! # Purpose
//! Turns request headers into either a [`Principal`] (interactive users) or a
//! resolved project (SDK callers). Handlers call these helpers first and pass
//! the result into the service layer explicitly.
//!
//! # Key invariants
//! - Every helper fails closed with `401`.
//! - API-key failures all carry the same message regardless of which factor
//!   was wrong.
//! - A session for a deactivated account is rejected even if its signature
//!   is still valid.
pub mod api_key;
pub mod password;
pub mod principal;
pub mod session;

use crate::api::error::{ApiError, api_unauthorized};
use crate::app::AppState;
use crate::model::Project;
use crate::service::ServiceError;
use api_key::{API_KEY_HEADER, PROJECT_ALIAS_HEADER, SCOPE_ALIAS_HEADER};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use principal::Principal;
use session::SESSION_COOKIE;

const INVALID_API_KEY: &str = "invalid api key";

/// Project and scope named by a validated three-factor API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedApiKey {
    pub project_alias: String,
    pub scope_alias: String,
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    value.strip_prefix("Bearer ")
}

fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Resolves the session from the `flagplane_session` cookie, falling back to
/// a bearer token.
pub async fn require_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = extract_cookie(headers, SESSION_COOKIE)
        .or_else(|| extract_bearer(headers))
        .ok_or_else(|| api_unauthorized("authentication required"))?;
    let principal = state.services.signer.verify(token).map_err(|err| {
        tracing::debug!(error = %err, "session rejected");
        api_unauthorized("invalid or expired session")
    })?;
    match state.services.me(&principal).await {
        Ok(_) => Ok(principal),
        Err(ServiceError::Unauthorized(message)) => Err(api_unauthorized(&message)),
        Err(err) => Err(err.into()),
    }
}

/// Bearer API key resolving the owning project.
pub async fn require_project_key(state: &AppState, headers: &HeaderMap) -> Result<Project, ApiError> {
    let Some(api_key) = extract_bearer(headers) else {
        return Err(api_unauthorized(INVALID_API_KEY));
    };
    match state
        .services
        .api_keys
        .validate_api_key_and_get_project(api_key)
        .await
    {
        Ok(Some(project)) => Ok(project),
        Ok(None) => {
            metrics::counter!("flagplane_api_key_rejections_total", "shape" => "bearer").increment(1);
            tracing::info!("bearer api key rejected");
            Err(api_unauthorized(INVALID_API_KEY))
        }
        Err(err) => Err(ServiceError::from(err).into()),
    }
}

/// `X-API-Key` plus project and scope alias headers, all three required.
pub async fn require_scoped_key(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<ScopedApiKey, ApiError> {
    let (Some(api_key), Some(project_alias), Some(scope_alias)) = (
        header(headers, API_KEY_HEADER),
        header(headers, PROJECT_ALIAS_HEADER),
        header(headers, SCOPE_ALIAS_HEADER),
    ) else {
        return Err(api_unauthorized(INVALID_API_KEY));
    };
    let valid = state
        .services
        .api_keys
        .validate_api_key(project_alias, api_key, scope_alias)
        .await
        .map_err(|err| ApiError::from(ServiceError::from(err)))?;
    if !valid {
        metrics::counter!("flagplane_api_key_rejections_total", "shape" => "three_factor")
            .increment(1);
        tracing::info!(project = project_alias, scope = scope_alias, "api key rejected");
        return Err(api_unauthorized(INVALID_API_KEY));
    }
    Ok(ScopedApiKey {
        project_alias: project_alias.to_string(),
        scope_alias: scope_alias.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; flagplane_session=abc.def.ghi; lang=en"),
        );
        assert_eq!(extract_cookie(&headers, SESSION_COOKIE), Some("abc.def.ghi"));
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[test]
    fn bearer_requires_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(extract_bearer(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        assert_eq!(extract_bearer(&headers), Some("token"));
    }

    #[test]
    fn blank_headers_count_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("   "));
        assert_eq!(header(&headers, API_KEY_HEADER), None);
    }
}
