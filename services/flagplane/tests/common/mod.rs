#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flagplane::app::{AppState, build_router};
use flagplane::auth::password::Argon2Hasher;
use flagplane::auth::session::SessionSigner;
use flagplane::cache::InMemoryEvaluationCache;
use flagplane::config::AdminSeedConfig;
use flagplane::service::Services;
use flagplane::store::memory::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub type TestService = axum::routing::RouterIntoService<Body, ()>;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "Bootstrap1pass";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

/// In-memory app with a bootstrapped admin.
pub async fn test_app() -> TestService {
    let signer =
        SessionSigner::from_seed([7u8; 32], Duration::from_secs(3600)).expect("signer");
    let services = Services::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryEvaluationCache::with_limits(
            Duration::from_secs(60),
            Duration::from_secs(5),
        )),
        Arc::new(Argon2Hasher),
        signer,
    );
    services
        .bootstrap_admin(Some(&AdminSeedConfig {
            username: ADMIN_USERNAME.to_string(),
            password: ADMIN_PASSWORD.to_string(),
            full_name: "System Administrator".to_string(),
        }))
        .await
        .expect("bootstrap");
    build_router(AppState { services }).into_service()
}

pub async fn login(app: &TestService, username: &str, password: &str) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "username": username, "password": password }).to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("login");
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await["token"]
        .as_str()
        .expect("token")
        .to_string()
}

pub async fn send(
    app: &TestService,
    request: Request<Body>,
) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json")
    };
    (status, body)
}
