//! HTTP behavior of the chat-completions generator against a mock server

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xshacl_cache::{ExplanationGenerator, GenerationRequest, GeneratorError};
use xshacl_cli::{GeneratorConfig, OpenAiGenerator};
use xshacl_core::{canonicalize, DomainContext, JustificationNode, ViolationRecord};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

fn generator(server: &MockServer) -> OpenAiGenerator {
    let config = GeneratorConfig::for_model("llama3")
        .with_base_url(format!("{}/v1", server.uri()))
        .with_api_key("test-key")
        .with_timeout_ms(2_000);
    OpenAiGenerator::new(config).unwrap()
}

fn record() -> ViolationRecord {
    ViolationRecord::new(
        "http://example.org/Alice",
        "http://example.org/PersonShape",
        "http://www.w3.org/ns/shacl#MinCountConstraintComponent",
    )
    .with_path("http://example.org/hasName")
    .with_message("Less than 1 values on ex:Alice->ex:hasName")
}

#[tokio::test]
async fn generates_explanation_and_suggestions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "llama3"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Alice has no name.  ")))
        .expect(2)
        .mount(&server)
        .await;

    let record = record();
    let signature = canonicalize(&record).unwrap();
    let tree = JustificationNode::conclusion("Alice fails to conform to PersonShape");
    let context = DomainContext::default();
    let request = GenerationRequest {
        record: &record,
        signature: &signature,
        justification: &tree,
        context: &context,
        language: "en",
        model: None,
    };

    let generated = generator(&server).generate(request).await.unwrap();
    assert_eq!(generated.text, "Alice has no name.");
    assert_eq!(generated.correction_suggestions, vec!["Alice has no name."]);
    assert_eq!(generated.model, "llama3");

    let requests = server.received_requests().await.unwrap();
    let prompt: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let content = prompt["messages"][0]["content"].as_str().unwrap();
    assert!(content.contains("Less than 1 values"));
    assert!(content.contains("'en'"));
}

#[tokio::test]
async fn request_model_overrides_configured_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gemma:2b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .mount(&server)
        .await;

    let record = record();
    let signature = canonicalize(&record).unwrap();
    let tree = JustificationNode::conclusion("c");
    let context = DomainContext::default();
    let request = GenerationRequest {
        record: &record,
        signature: &signature,
        justification: &tree,
        context: &context,
        language: "es",
        model: Some("gemma:2b"),
    };

    let generated = generator(&server).generate(request).await.unwrap();
    assert_eq!(generated.model, "gemma:2b");
}

async fn failing_with(status: u16, body: serde_json::Value) -> GeneratorError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;

    let record = record();
    let signature = canonicalize(&record).unwrap();
    let tree = JustificationNode::conclusion("c");
    let context = DomainContext::default();
    let request = GenerationRequest {
        record: &record,
        signature: &signature,
        justification: &tree,
        context: &context,
        language: "en",
        model: None,
    };
    generator(&server).generate(request).await.unwrap_err()
}

#[tokio::test]
async fn rate_limit_is_retryable() {
    let err = failing_with(429, json!({"error": {"message": "slow down"}})).await;
    assert_eq!(err, GeneratorError::RateLimited("slow down".into()));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn server_error_is_retryable_but_auth_error_is_not() {
    let err = failing_with(503, json!({"error": {"message": "overloaded"}})).await;
    assert!(matches!(err, GeneratorError::Api { status: 503, .. }));
    assert!(err.is_retryable());

    let err = failing_with(401, json!({"error": {"message": "bad key"}})).await;
    assert_eq!(
        err,
        GeneratorError::Api {
            status: 401,
            message: "bad key".into()
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn empty_choices_are_malformed() {
    let err = failing_with(200, json!({"choices": []})).await;
    assert!(matches!(err, GeneratorError::MalformedOutput(_)));
}
