//! Integration tests for task submission and results.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, memory_app, post_form, post_json, PUBLIC_BASE_URL};
use serde_json::json;
use spotline_db::store::TaskStore;

#[tokio::test]
async fn submit_creates_queued_task_with_signed_callback() {
    let (app, store) = memory_app();

    let response = post_json(
        app.clone(),
        "/api/v1/tasks",
        json!({ "kind": "Pipeline", "command": ["echo", "hi"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let data = &json["data"];
    assert_eq!(data["kind"], "Pipeline");
    assert_eq!(data["status_id"], 1);
    assert_eq!(data["attempts"], 0);
    assert!(data["worker_id"].is_null());

    // The signed URL is usable as-is by a worker.
    let callback_url = data["callback_url"].as_str().unwrap();
    let prefix = format!("{PUBLIC_BASE_URL}/callback/");
    assert!(callback_url.starts_with(&prefix));
    let path = &callback_url[PUBLIC_BASE_URL.len()..];

    let response = post_form(app, path, &[("state", "ready"), ("worker_id", "i-1")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["command"], json!(["echo", "hi"]));

    let id = data["id"].as_i64().unwrap();
    assert!(store.find_by_id(id).await.unwrap().unwrap().worker_id.is_some());
}

#[tokio::test]
async fn submit_rejects_empty_command() {
    let (app, _store) = memory_app();

    let response = post_json(
        app,
        "/api/v1/tasks",
        json!({ "kind": "Pipeline", "command": [] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn submit_rejects_bad_kind() {
    let (app, _store) = memory_app();

    let response = post_json(
        app,
        "/api/v1/tasks",
        json!({ "kind": "no spaces", "command": ["echo"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_returns_task_or_404() {
    let (app, store) = memory_app();
    let task = common::seed_task(&store, "Pipeline", &["echo"]).await;

    let response = get(app.clone(), &format!("/api/v1/tasks/{}", task.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["id"], task.id);

    let response = get(app, "/api/v1/tasks/9999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_filters_by_status() {
    let (app, store) = memory_app();
    common::seed_task(&store, "Pipeline", &["a"]).await;
    common::seed_task(&store, "Pipeline", &["b"]).await;
    store.claim_next("Pipeline", "i-1", 3).await.unwrap();

    let response = get(app.clone(), "/api/v1/tasks?status=queued").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["command"], json!(["b"]));

    let response = get(app.clone(), "/api/v1/tasks").await;
    assert_eq!(body_json(response).await["data"].as_array().unwrap().len(), 2);

    let response = get(app, "/api/v1/tasks?status=sleeping").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
