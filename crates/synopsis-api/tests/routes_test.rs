//! Route-level tests against the in-memory backend and the mock inference
//! backend.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use synopsis_api::{router, AppState, ServiceOptions, SynopsisService};
use synopsis_db::Storage;
use synopsis_inference::MockInferenceBackend;

fn app_with(backend: MockInferenceBackend) -> Router {
    let backend = Arc::new(backend);
    let service = SynopsisService::new(
        Storage::memory(),
        backend.clone(),
        backend,
        ServiceOptions::default(),
    );
    router(AppState::new(service))
}

fn grouped_backend() -> MockInferenceBackend {
    [
        ("left-1", [1.0_f32, 2.0]),
        ("right-1", [10.0, 2.0]),
        ("left-2", [1.0, 4.0]),
        ("right-2", [10.0, 4.0]),
        ("left-3", [1.0, 0.0]),
        ("right-3", [10.0, 0.0]),
    ]
    .into_iter()
    .fold(MockInferenceBackend::new(), |backend, (text, v)| {
        backend.with_embedding(text, v.to_vec())
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body)
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_for_job(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send_json(app, get(&format!("/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "running" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn test_root_and_health() {
    let app = app_with(MockInferenceBackend::new());

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"42");

    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["cache"]["enabled"], true);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = app_with(MockInferenceBackend::new());
    let response = app.oneshot(get("/")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_summarize_json_and_cache_hit() {
    let backend = MockInferenceBackend::new().with_summary("hello", "summary-A");
    let app = app_with(backend.clone());

    for _ in 0..2 {
        let (status, body) =
            send_json(&app, post_json("/summarize", json!({ "text": "hello" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "summary-A");
    }
    assert_eq!(backend.summarize_call_count(), 1);
}

#[tokio::test]
async fn test_summarize_no_cache_calls_backend_each_time() {
    let backend = MockInferenceBackend::new();
    let app = app_with(backend.clone());

    for _ in 0..2 {
        let (status, _) = send_json(
            &app,
            post_json("/summarize", json!({ "text": "hello", "no_cache": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(backend.summarize_call_count(), 2);
}

#[tokio::test]
async fn test_summarize_base64_body() {
    let backend = MockInferenceBackend::new().with_summary("encoded text", "decoded-summary");
    let app = app_with(backend);

    let payload = json!({ "text": "encoded text", "max_length": 50 }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/summarize")
        .header(header::CONTENT_ENCODING, "base64")
        .body(Body::from(
            base64::engine::general_purpose::STANDARD.encode(payload),
        ))
        .unwrap();

    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "decoded-summary");
}

#[tokio::test]
async fn test_summarize_errors_map_to_status_codes() {
    let app = app_with(MockInferenceBackend::new());

    let bad_base64 = Request::builder()
        .method("POST")
        .uri("/summarize")
        .header(header::CONTENT_ENCODING, "base64")
        .body(Body::from("@@not base64@@"))
        .unwrap();
    let (status, body) = send_json(&app, bad_base64).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("base64"));

    let (status, body) = send_json(&app, post_json("/summarize", json!({ "text": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send_json(
        &app,
        post_json(
            "/summarize",
            json!({ "text": "x", "min_length": 20, "max_length": 5 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let failing = app_with(MockInferenceBackend::new().with_summarize_failure());
    let (status, body) = send_json(&failing, post_json("/summarize", json!({ "text": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("Inference"));
}

#[tokio::test]
async fn test_embed_and_nearest() {
    let app = app_with(grouped_backend());

    let mut ids = Vec::new();
    for text in ["left-1", "left-2", "right-1"] {
        let (status, body) = send_json(
            &app,
            post_json("/embeddings", json!({ "batch_id": "b1", "text": text })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        ids.push(body["id"].as_str().unwrap().to_string());
    }
    let (_, other) = send_json(
        &app,
        post_json("/embeddings", json!({ "batch_id": "b2", "text": "left-3" })),
    )
    .await;

    let (status, body) = send_json(&app, get(&format!("/embeddings/{}/nearest", ids[0]))).await;
    assert_eq!(status, StatusCode::OK);
    let hits = body.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["id"], ids[1].as_str());
    assert_eq!(hits[0]["distance"], 2.0);
    assert_eq!(hits[1]["id"], ids[2].as_str());
    assert!(hits.iter().all(|h| h["id"] != other["id"]));

    let (status, body) =
        send_json(&app, get(&format!("/embeddings/{}/nearest?limit=1", ids[0]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_nearest_errors() {
    let app = app_with(MockInferenceBackend::new());

    let unknown = uuid::Uuid::now_v7();
    let (status, body) = send_json(&app, get(&format!("/embeddings/{unknown}/nearest"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (_, created) = send_json(
        &app,
        post_json("/embeddings", json!({ "batch_id": "b1", "text": "anything" })),
    )
    .await;
    let id = created["id"].as_str().unwrap();
    let (status, _) = send_json(&app, get(&format!("/embeddings/{id}/nearest?limit=-1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_embed_validation() {
    let app = app_with(MockInferenceBackend::new());
    let (status, _) = send_json(
        &app,
        post_json("/embeddings", json!({ "batch_id": "", "text": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let failing = app_with(MockInferenceBackend::new().with_embed_failure());
    let (status, _) = send_json(
        &failing,
        post_json("/embeddings", json!({ "batch_id": "b1", "text": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_clustering_job_completes() {
    let app = app_with(grouped_backend());
    for text in ["left-1", "right-1", "left-2", "right-2", "left-3", "right-3"] {
        let (status, _) = send_json(
            &app,
            post_json("/embeddings", json!({ "batch_id": "b1", "text": text })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send_json(
        &app,
        post_json("/clusters", json!({ "batch_id": "b1", "k": 2, "job_id": "c1" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["job_id"], "c1");

    let job = wait_for_job(&app, "c1").await;
    assert_eq!(job["id"], "c1");
    assert_eq!(job["status"], "complete");
    assert!(job.get("error").is_none());
}

#[tokio::test]
async fn test_clustering_empty_batch_fails() {
    let app = app_with(MockInferenceBackend::new());

    let (status, body) = send_json(
        &app,
        post_json("/clusters", json!({ "batch_id": "empty-batch", "k": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&job_id).is_ok());

    let job = wait_for_job(&app, &job_id).await;
    assert_eq!(job["status"], "failed");
    assert!(job["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let app = app_with(MockInferenceBackend::new());
    let (status, body) = send_json(&app, get("/jobs/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));
}
