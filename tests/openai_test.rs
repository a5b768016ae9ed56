//! Wiremock integration tests for the OpenAI-compatible backend.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mimir::cache::{CacheLayer, MemoryStore, ReplayPacing};
use mimir::providers::{CachedBackend, OpenAiBackend, OpenAiConfig};
use mimir::{CallParams, FinishReason, MimirError, ModelBackend, StreamPart};

// ============================================================================
// Helpers
// ============================================================================

fn backend(server: &MockServer, model: &str) -> OpenAiBackend {
    let config = OpenAiConfig::new("test_key").base_url(server.uri());
    OpenAiBackend::new(&config, model).unwrap()
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_709_296_200,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
    })
}

fn sse_body(chunks: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn stream_chunks() -> Vec<serde_json::Value> {
    vec![
        json!({
            "id": "chatcmpl-2", "created": 1_709_296_200, "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]
        }),
        json!({
            "id": "chatcmpl-2", "created": 1_709_296_200, "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": "Hel"}}]
        }),
        json!({
            "id": "chatcmpl-2", "created": 1_709_296_200, "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": "stop"}]
        }),
        json!({
            "id": "chatcmpl-2", "created": 1_709_296_200, "model": "gpt-4o-mini",
            "choices": [],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }),
    ]
}

// ============================================================================
// Single-shot
// ============================================================================

#[tokio::test]
async fn generate_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test_key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
        .expect(1)
        .mount(&server)
        .await;

    let result = backend(&server, "gpt-4o-mini")
        .generate(&CallParams::prompt("hi"))
        .await
        .expect("generate should succeed");

    assert_eq!(result.text, "hello");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.usage.map(|u| u.total_tokens), Some(7));
    assert_eq!(result.response.id.as_deref(), Some("chatcmpl-1"));
    assert_eq!(
        result.response.timestamp.map(|t| t.timestamp()),
        Some(1_709_296_200)
    );
}

#[tokio::test]
async fn generate_sends_system_prompt_and_settings() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ],
            "seed": 7,
            "max_tokens": 32
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let params = CallParams::prompt("hi")
        .system("be brief")
        .seed(7)
        .max_tokens(32);
    let result = backend(&server, "gpt-4o-mini").generate(&params).await.unwrap();
    assert_eq!(result.text, "ok");
}

#[tokio::test]
async fn generate_tool_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-3",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let result = backend(&server, "gpt-4o")
        .generate(&CallParams::prompt("find x"))
        .await
        .unwrap();

    assert_eq!(result.text, "");
    assert_eq!(result.finish_reason, FinishReason::ToolCalls);
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].name, "lookup");
    assert_eq!(result.tool_calls[0].arguments, r#"{"q":"x"}"#);
}

#[tokio::test]
async fn generate_without_choices_is_empty_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = backend(&server, "gpt-4o")
        .generate(&CallParams::prompt("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, MimirError::EmptyResponse));
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn unauthorized_maps_to_authentication_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    let err = backend(&server, "gpt-4o")
        .generate(&CallParams::prompt("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, MimirError::AuthenticationFailed));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn not_found_maps_to_model_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = backend(&server, "gpt-9")
        .generate(&CallParams::prompt("hi"))
        .await
        .unwrap_err();
    match err {
        MimirError::ModelNotFound(model) => assert_eq!(model, "gpt-9"),
        other => panic!("expected ModelNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;

    let err = backend(&server, "gpt-4o")
        .generate(&CallParams::prompt("hi"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn server_error_uses_provider_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"message": "overloaded", "type": "server_error"}
        })))
        .mount(&server)
        .await;

    let err = backend(&server, "gpt-4o")
        .generate(&CallParams::prompt("hi"))
        .await
        .unwrap_err();
    match &err {
        MimirError::Api { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "overloaded");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn bad_request_keeps_raw_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad things"))
        .mount(&server)
        .await;

    let err = backend(&server, "gpt-4o")
        .generate(&CallParams::prompt("hi"))
        .await
        .unwrap_err();
    match err {
        MimirError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "bad things");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn stream_decodes_sse_frames() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "stream": true,
            "stream_options": {"include_usage": true}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&stream_chunks()), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server, "gpt-4o-mini")
        .stream(&CallParams::prompt("hi").temperature(0.5))
        .await
        .expect("stream should open");

    let raw_prompt = response.raw_call.raw_prompt.clone().unwrap();
    assert_eq!(raw_prompt, json!([{"role": "user", "content": "hi"}]));
    assert_eq!(response.raw_call.raw_settings["temperature"], json!(0.5));
    assert!(!response.raw_call.raw_settings.contains_key("messages"));

    let parts: Vec<StreamPart> = response.stream.map(|p| p.unwrap()).collect().await;

    assert!(matches!(&parts[0], StreamPart::ResponseMetadata(meta)
        if meta.id.as_deref() == Some("chatcmpl-2")
            && meta.timestamp.map(|t| t.timestamp()) == Some(1_709_296_200)));
    let text: String = parts
        .iter()
        .filter_map(|p| match p {
            StreamPart::TextDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
    match parts.last().unwrap() {
        StreamPart::Finish {
            finish_reason,
            usage,
        } => {
            assert_eq!(*finish_reason, FinishReason::Stop);
            assert_eq!(usage.as_ref().map(|u| u.total_tokens), Some(7));
        }
        other => panic!("expected finish, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_in_band_error_is_forwarded() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\n\ndata: {}\n\n",
        stream_chunks()[1],
        json!({"error": {"message": "upstream exploded"}})
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let response = backend(&server, "gpt-4o")
        .stream(&CallParams::prompt("hi"))
        .await
        .unwrap();
    let items: Vec<_> = response.stream.collect().await;

    assert!(items.iter().any(|i| matches!(i, Err(MimirError::Stream(m)) if m.contains("exploded"))));
    assert!(!items.iter().any(|i| matches!(i, Ok(StreamPart::Finish { .. }))));
}

#[tokio::test]
async fn stream_open_failure_is_returned() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = backend(&server, "gpt-4o")
        .stream(&CallParams::prompt("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, MimirError::AuthenticationFailed));
}

// ============================================================================
// Through the cache
// ============================================================================

#[tokio::test]
async fn cached_generate_calls_provider_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
        .expect(1)
        .mount(&server)
        .await;

    let layer = CacheLayer::new(Arc::new(MemoryStore::default()));
    let cached = CachedBackend::new(Arc::new(backend(&server, "gpt-4o-mini")), layer);
    let params = CallParams::prompt("hi");

    let first = cached.generate(&params).await.unwrap();
    let second = cached.generate(&params).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.response.timestamp, first.response.timestamp);
}

#[tokio::test]
async fn cached_stream_calls_provider_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&stream_chunks()), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let layer =
        CacheLayer::new(Arc::new(MemoryStore::default())).with_pacing(ReplayPacing::immediate());
    let cached = CachedBackend::new(Arc::new(backend(&server, "gpt-4o-mini")), layer);
    let params = CallParams::prompt("hi");

    let live: Vec<StreamPart> = cached
        .stream(&params)
        .await
        .unwrap()
        .stream
        .map(|p| p.unwrap())
        .collect()
        .await;
    let replayed = cached.stream(&params).await.unwrap();
    assert!(replayed.raw_call.raw_prompt.is_none());
    let replayed: Vec<StreamPart> = replayed.stream.map(|p| p.unwrap()).collect().await;

    assert_eq!(live, replayed);
}
