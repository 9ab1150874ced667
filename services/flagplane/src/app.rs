//! HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::service::Services;
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri().path(),
                version = ?request.version()
            )
        });

    Router::new()
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route("/v1/auth/login", axum::routing::post(api::auth::login))
        .route("/v1/auth/logout", axum::routing::post(api::auth::logout))
        .route("/v1/auth/me", axum::routing::get(api::auth::me))
        .route(
            "/v1/auth/change-password",
            axum::routing::post(api::auth::change_password),
        )
        .route(
            "/v1/users",
            axum::routing::get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/v1/users/:user_id",
            axum::routing::get(api::users::get_user)
                .patch(api::users::update_user)
                .delete(api::users::deactivate_user),
        )
        .route(
            "/v1/projects",
            axum::routing::get(api::projects::list_projects).post(api::projects::create_project),
        )
        .route(
            "/v1/projects/:project_id",
            axum::routing::get(api::projects::get_project)
                .patch(api::projects::update_project)
                .delete(api::projects::delete_project),
        )
        .route(
            "/v1/projects/:project_id/api-key/regenerate",
            axum::routing::post(api::projects::regenerate_api_key),
        )
        .route(
            "/v1/projects/:project_id/archive",
            axum::routing::post(api::projects::archive_project),
        )
        .route(
            "/v1/projects/:project_id/unarchive",
            axum::routing::post(api::projects::unarchive_project),
        )
        .route(
            "/v1/projects/:project_id/my-permissions",
            axum::routing::get(api::projects::my_permissions),
        )
        .route(
            "/v1/projects/:project_id/scopes",
            axum::routing::get(api::scopes::list_scopes).post(api::scopes::create_scope),
        )
        .route(
            "/v1/projects/:project_id/scopes/:scope_id",
            axum::routing::patch(api::scopes::update_scope).delete(api::scopes::delete_scope),
        )
        .route(
            "/v1/projects/:project_id/flags",
            axum::routing::get(api::flags::list_flags).post(api::flags::create_flag),
        )
        .route(
            "/v1/projects/:project_id/flags/:flag_id",
            axum::routing::get(api::flags::get_flag)
                .patch(api::flags::update_flag)
                .delete(api::flags::delete_flag),
        )
        .route(
            "/v1/projects/:project_id/flags/:flag_id/values/:scope_id",
            axum::routing::put(api::flags::update_flag_value),
        )
        .route(
            "/v1/projects/:project_id/members",
            axum::routing::get(api::members::list_members).post(api::members::invite_member),
        )
        .route(
            "/v1/projects/:project_id/members/available",
            axum::routing::get(api::members::available_users),
        )
        .route(
            "/v1/projects/:project_id/members/:user_id",
            axum::routing::get(api::members::get_member).delete(api::members::remove_member),
        )
        .route(
            "/v1/projects/:project_id/members/:user_id/permissions",
            axum::routing::put(api::members::replace_permissions),
        )
        .route(
            "/v1/projects/:project_id/members/:user_id/project-permissions",
            axum::routing::post(api::members::assign_project_permissions),
        )
        .route(
            "/v1/projects/:project_id/members/:user_id/project-permissions/:permission",
            axum::routing::delete(api::members::revoke_project_permission),
        )
        .route(
            "/v1/projects/:project_id/members/:user_id/scope-permissions",
            axum::routing::post(api::members::assign_scope_permissions),
        )
        .route(
            "/v1/projects/:project_id/members/:user_id/scope-permissions/:scope_id/:permission",
            axum::routing::delete(api::members::revoke_scope_permission),
        )
        .route("/sdk/v1/features", axum::routing::get(api::sdk::get_feature))
        .route(
            "/sdk/v1/flags/evaluate",
            axum::routing::post(api::sdk::evaluate_flag),
        )
        .route(
            "/sdk/v1/flags/evaluate-all",
            axum::routing::post(api::sdk::evaluate_all),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
