use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dimension: u32) -> EmbeddingConfig {
    let address = server.address();
    EmbeddingConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "test-model".to_string(),
        batch_size: 2,
        dimension,
        ..EmbeddingConfig::default()
    }
}

#[test]
fn client_configuration() {
    let config = EmbeddingConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        ..EmbeddingConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.dimension, DEFAULT_EMBEDDING_DIMENSION as usize);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&EmbeddingConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[tokio::test]
async fn embed_batch_splits_requests_by_batch_size() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "test-model", "input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.0, 0.0, 1.0]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 3)).expect("client builds");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let vectors = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("blocking task completes")
        .expect("embedding succeeds");

    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[2], vec![0.0, 0.0, 1.0]);
}

#[tokio::test]
async fn single_embed_uses_batch_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["where is my order"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5, 0.0]]})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 3)).expect("client builds");
    let vector = tokio::task::spawn_blocking(move || client.embed("where is my order"))
        .await
        .expect("blocking task completes")
        .expect("embedding succeeds");

    assert_eq!(vector, vec![0.5, 0.5, 0.0]);
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 3)).expect("client builds");
    let result = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("blocking task completes");

    assert!(matches!(
        result,
        Err(FaqError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "model not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 3)).expect("client builds");
    let result = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("blocking task completes");

    assert!(matches!(result, Err(FaqError::EmbeddingUnavailable(_))));
}

#[tokio::test]
async fn malformed_reply_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 3))
        .expect("client builds")
        .with_retry_attempts(1);
    let result = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("blocking task completes");

    assert!(matches!(result, Err(FaqError::EmbeddingUnavailable(_))));
}

#[tokio::test]
async fn health_check_requires_listed_model() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-model", "size": 1024, "digest": "abc"}]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server, 3);
    let present = OllamaClient::new(&config).expect("client builds");
    let missing = OllamaClient::new(&EmbeddingConfig {
        model: "other-model".to_string(),
        ..config
    })
    .expect("client builds");

    let (present, missing) = tokio::task::spawn_blocking(move || {
        (present.health_check(), missing.health_check())
    })
    .await
    .expect("blocking task completes");

    assert!(present.is_ok());
    assert!(missing.is_err());
}
