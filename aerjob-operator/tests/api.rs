//! HTTP API tests
//!
//! Drives the router in-process against the in-memory store.

use aerjob_core::domain::job::Phase;
use aerjob_operator::api::{AppState, create_router};
use aerjob_operator::builder::WorkerSpecBuilder;
use aerjob_operator::controller::Controller;
use aerjob_operator::reconciler::Reconciler;
use aerjob_operator::reconciler::policy::RequeuePolicy;
use aerjob_operator::store::{MemoryStore, ObjectStore};
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Helper to create a test AppState
fn setup_test_state() -> AppState {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        WorkerSpecBuilder::default(),
        RequeuePolicy::default(),
    ));
    let (_controller, trigger) =
        Controller::new(reconciler, Arc::clone(&store), Duration::from_secs(30), 1);

    AppState { store, trigger }
}

/// Helper to make HTTP requests to the router
async fn make_request(
    state: AppState,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let app = create_router(state);

    let request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, value)
}

fn bell_request() -> Value {
    json!({
        "name": "bell",
        "spec": {
            "workerImage": "quay.io/aer/worker:1.2",
            "circuits": "UUlTS2l0",
            "shots": 4096
        }
    })
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (status, body) = make_request(setup_test_state(), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_submit_job_applies_defaults() {
    let state = setup_test_state();

    let (status, body) =
        make_request(state.clone(), "POST", "/api/jobs", Some(bell_request())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "bell");
    assert_eq!(body["spec"]["shots"], 4096);
    assert_eq!(body["spec"]["backendName"], "aer-simulator");
    assert_eq!(body["spec"]["maxRetries"], 3);
    assert_eq!(body["spec"]["timeoutSeconds"], 600);
    assert_eq!(body["spec"]["ttlSecondsAfterFinished"], 300);

    let stored = state.store.get_job("bell").await.unwrap();
    assert_eq!(stored.status.phase, Phase::Unstarted);
}

#[tokio::test]
async fn test_duplicate_submit_conflicts() {
    let state = setup_test_state();

    make_request(state.clone(), "POST", "/api/jobs", Some(bell_request())).await;
    let (status, body) =
        make_request(state, "POST", "/api/jobs", Some(bell_request())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Job bell already exists");
}

#[tokio::test]
async fn test_invalid_submit_is_rejected() {
    let state = setup_test_state();

    let mut request = bell_request();
    request["name"] = json!("Bell_State");
    let (status, _) = make_request(state.clone(), "POST", "/api/jobs", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut request = bell_request();
    request["spec"]["workerImage"] = json!("  ");
    let (status, body) = make_request(state, "POST", "/api/jobs", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("workerImage"));
}

#[tokio::test]
async fn test_get_list_and_delete_job() {
    let state = setup_test_state();
    make_request(state.clone(), "POST", "/api/jobs", Some(bell_request())).await;

    let (status, body) = make_request(state.clone(), "GET", "/api/jobs/bell", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["phase"], "unstarted");

    let (status, body) = make_request(state.clone(), "GET", "/api/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, _) = make_request(state.clone(), "DELETE", "/api/jobs/bell", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = make_request(state, "GET", "/api/jobs/bell", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Job bell not found");
}
