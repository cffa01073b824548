//! HTTP-level tests for the Ollama backend against a mock server.

#![cfg(feature = "ollama")]

use std::time::Duration;

use serde_json::json;
use synopsis_core::{EmbeddingBackend, Error, SummarizationBackend, SummarizeParams};
use synopsis_inference::{OllamaBackend, OllamaConfig};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> OllamaBackend {
    OllamaBackend::new(
        OllamaConfig::default()
            .with_base_url(server.uri())
            .with_embed_model("test-embed")
            .with_gen_model("test-gen")
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2)),
    )
    .expect("Failed to create backend")
}

#[tokio::test]
async fn test_embed_posts_to_api_embed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "test-embed", "input": ["hello"] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.5, -0.25, 1.0]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let vector = backend_for(&server).embed("hello").await.unwrap();
    assert_eq!(vector, vec![0.5, -0.25, 1.0]);
}

#[tokio::test]
async fn test_summarize_posts_options_and_truncates_input() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "test-gen",
            "stream": false,
            "options": { "num_predict": 120, "temperature": 0.0 }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "response": "  a summary \n" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let params = SummarizeParams {
        max_length: 120,
        ..Default::default()
    };
    let long_text = "x".repeat(5000);
    let summary = backend_for(&server)
        .summarize(&long_text, &params)
        .await
        .unwrap();
    assert_eq!(summary, "a summary");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let prompt = body["prompt"].as_str().unwrap();
    assert!(prompt.ends_with(&format!("\n{}", "x".repeat(3000))));
}

#[tokio::test]
async fn test_server_error_maps_to_inference_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let err = backend_for(&server).embed("hello").await.unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
    assert!(err.to_string().contains("model not loaded"));
}

#[tokio::test]
async fn test_empty_embeddings_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [] })))
        .mount(&server)
        .await;

    let err = backend_for(&server).embed("hello").await.unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "embeddings": [[1.0]] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = backend_for(&server).embed("hello").await.unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;

    assert!(backend_for(&server).health_check().await);
}
