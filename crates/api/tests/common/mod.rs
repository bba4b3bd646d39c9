#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use spotline_db::models::task::{SubmitTask, Task};
use spotline_db::store::{MemoryTaskStore, TaskStore};
use tower::ServiceExt;

use spotline_api::auth::callback_token::{self, CallbackTokenConfig};
use spotline_api::config::ServerConfig;
use spotline_api::router::build_app_router;
use spotline_api::state::AppState;

pub const PUBLIC_BASE_URL: &str = "http://controller.test";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://dashboard.test".to_string()],
        request_timeout_secs: 30,
        public_base_url: PUBLIC_BASE_URL.to_string(),
        max_attempts: 3,
        callback: CallbackTokenConfig {
            secret: "test-callback-secret".to_string(),
            expiry_days: 7,
        },
    }
}

/// Build the full application router over `store`, with the same
/// middleware stack production uses.
pub fn build_test_app(store: Arc<dyn TaskStore>) -> Router {
    let config = test_config();
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

/// Router over a fresh in-memory store; the store handle is returned for
/// assertions.
pub fn memory_app() -> (Router, MemoryTaskStore) {
    let store = MemoryTaskStore::new();
    (build_test_app(Arc::new(store.clone())), store)
}

/// Path of the callback endpoint for a freshly signed `kind` token.
pub fn callback_path(kind: &str) -> String {
    let token = callback_token::sign(kind, &test_config().callback).unwrap();
    format!("/callback/{token}")
}

/// Insert a queued task directly into the store.
pub async fn seed_task(store: &MemoryTaskStore, kind: &str, command: &[&str]) -> Task {
    store
        .submit(&SubmitTask {
            kind: kind.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            callback_url: format!("{PUBLIC_BASE_URL}{}", callback_path(kind)),
        })
        .await
        .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a form body given as already-encoded `key=value` pairs.
pub async fn post_form(app: Router, uri: &str, pairs: &[(&str, &str)]) -> Response<Body> {
    let body = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
