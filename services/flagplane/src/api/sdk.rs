//! SDK read endpoints authenticated by project API key.
//!
//! `/sdk/v1/features` takes the three-factor headers and reads through the
//! evaluation cache. `/sdk/v1/flags/*` takes a bearer key and reads the scope
//! from the request body.
use crate::api::error::ApiError;
use crate::api::types::{
    EvaluateAllRequest, EvaluateAllResponse, EvaluateFlagRequest, FeatureQuery,
    FeatureValueResponse, FlagEvaluation,
};
use crate::app::AppState;
use crate::auth::{require_project_key, require_scoped_key};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;

#[utoipa::path(
    get,
    path = "/sdk/v1/features",
    tag = "sdk",
    params(
        FeatureQuery,
        ("X-API-Key" = String, Header, description = "Project API key"),
        ("x-project-alias" = String, Header, description = "Project alias"),
        ("x-scope-alias" = String, Header, description = "Scope alias")
    ),
    responses(
        (status = 200, description = "Flag value in the scope", body = FeatureValueResponse),
        (status = 401, description = "Invalid api key", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown flag", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_feature(
    Query(query): Query<FeatureQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FeatureValueResponse>, ApiError> {
    let key = require_scoped_key(&state, &headers).await?;
    let value = state
        .services
        .get_flag_value(&key.project_alias, &key.scope_alias, &query.flag_key)
        .await?;
    Ok(Json(FeatureValueResponse {
        flag_key: query.flag_key,
        scope: key.scope_alias,
        enabled: value.enabled,
    }))
}

#[utoipa::path(
    post,
    path = "/sdk/v1/flags/evaluate",
    tag = "sdk",
    request_body = EvaluateFlagRequest,
    responses(
        (status = 200, description = "Evaluation result", body = FlagEvaluation),
        (status = 401, description = "Invalid api key", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown flag or scope", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn evaluate_flag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EvaluateFlagRequest>,
) -> Result<Json<FlagEvaluation>, ApiError> {
    let project = require_project_key(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .evaluate_flag(&project, &body.flag_key, &body.context)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sdk/v1/flags/evaluate-all",
    tag = "sdk",
    request_body = EvaluateAllRequest,
    responses(
        (status = 200, description = "Every flag in the scope", body = EvaluateAllResponse),
        (status = 401, description = "Invalid api key", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn evaluate_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EvaluateAllRequest>,
) -> Result<Json<EvaluateAllResponse>, ApiError> {
    let project = require_project_key(&state, &headers).await?;
    Ok(Json(
        state
            .services
            .evaluate_all(&project, &body.context)
            .await?,
    ))
}
