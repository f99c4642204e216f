mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

const A_PY: &str = "def parse_order(raw):\n    \"\"\"Parse an order payload.\"\"\"\n    return raw\n";

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder.header("content-type", "application/json").body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let h = common::harness(&[]);
    let app = archintel::server::router(h.orchestrator.clone());

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn bad_location_is_a_400() {
    let h = common::harness(&[]);
    let app = archintel::server::router(h.orchestrator.clone());

    let (status, body) = send(&app, "POST", "/projects", Some(json!({ "source_location": "; rm -rf /" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("forbidden pattern"));

    let (status, _) = send(&app, "POST", "/projects", Some(json!({ "source_location": "https://evil.example.com/o/r" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_project_is_a_404() {
    let h = common::harness(&[]);
    let app = archintel::server::router(h.orchestrator.clone());
    let id = uuid::Uuid::new_v4();

    for (method, uri) in [
        ("GET", format!("/projects/{id}/status")),
        ("POST", format!("/projects/{id}/sync")),
        ("GET", format!("/projects/{id}/documents")),
    ] {
        let (status, _) = send(&app, method, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn register_sync_and_read_back() {
    let h = common::harness(&[("orders.py", A_PY)]);
    let app = archintel::server::router(h.orchestrator.clone());

    let (status, body) = send(&app, "POST", "/projects", Some(json!({ "source_location": common::LOCATION }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], json!("registered"));
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", &format!("/projects/{id}/documents?target=file:orders.py"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("not_yet_generated"));

    let (status, body) = send(&app, "POST", &format!("/projects/{id}/sync"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], json!("started"));

    let project = body_uuid(&id);
    h.orchestrator.wait_for_run(project, Duration::from_secs(30)).await.unwrap();

    let (_, body) = send(&app, "GET", &format!("/projects/{id}/status"), None).await;
    assert_eq!(body["state"], json!("ready"));
    assert_eq!(body["last_graph_version"], json!(1));

    let (status, body) = send(&app, "GET", &format!("/projects/{id}/structure"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"][0]["path"], json!("orders.py"));
    assert_eq!(body["files"][0]["symbols"][0]["children"][0]["name"], json!("parse_order"));

    let (status, body) =
        send(&app, "GET", &format!("/projects/{id}/documents?target=file:orders.py&type=reference"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("found"));
    assert!(body["document"]["content"].as_str().unwrap().contains("parse_order"));

    let (status, body) = send(&app, "POST", &format!("/projects/{id}/ask"), Some(json!({ "question": "How is an order parsed?" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("answered"));
    assert_eq!(body["citations"][0]["path"], json!("orders.py"));

    let (status, body) = send(&app, "POST", &format!("/projects/{id}/ask"), Some(json!({ "question": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("question is empty"));

    let (status, _) = send(&app, "GET", &format!("/projects/{id}/documents?type=poem"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn body_uuid(id: &str) -> uuid::Uuid {
    id.parse().unwrap()
}
