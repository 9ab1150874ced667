//! Sign-in, sign-out and account self-service endpoints.
//!
//! Login returns the session assertion in the body and sets it as an
//! `HttpOnly` cookie; browser clients use the cookie, scripts use the body.
use crate::api::error::ApiError;
use crate::api::types::{ChangePasswordRequest, LoginRequest, LoginResponse};
use crate::app::AppState;
use crate::auth::require_principal;
use crate::auth::session::SESSION_COOKIE;
use crate::model::User;
use axum::Json;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}")
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.services.login(&body.username, &body.password).await?;
    let cookie = session_cookie(&response.token, response.expires_in);
    Ok(([(SET_COOKIE, cookie)], Json(response)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "auth",
    responses((status = 204, description = "Session cookie cleared"))
)]
pub(crate) async fn logout() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, session_cookie("", 0))],
    )
}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not signed in", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    Ok(Json(state.services.me(&principal).await?))
}

#[utoipa::path(
    post,
    path = "/v1/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password wrong or new password too weak", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&state, &headers).await?;
    state.services.change_password(&principal, body).await?;
    Ok(StatusCode::NO_CONTENT)
}
