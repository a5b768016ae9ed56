//! Tagged reasoning split out of model output, single-shot and streaming.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mimir::cache::{CacheLayer, MemoryStore, ReplayPacing};
use mimir::providers::{
    CachedBackend, DEFAULT_REASONING_TAG, REASONING_ALIAS, REASONING_MODEL, ReasoningBackend,
};
use mimir::{
    CallParams, FinishReason, GenerateResult, Mimir, ModelBackend, RawCall, Result, StreamPart,
    StreamResponse,
};

// ============================================================================
// Scripted backend
// ============================================================================

/// Answers with fixed text, and streams fixed deltas.
struct ThinkingBackend {
    text: &'static str,
    deltas: Vec<&'static str>,
    generates: AtomicUsize,
    streams: AtomicUsize,
}

impl ThinkingBackend {
    fn new(text: &'static str, deltas: Vec<&'static str>) -> Self {
        Self {
            text,
            deltas,
            generates: AtomicUsize::new(0),
            streams: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ModelBackend for ThinkingBackend {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "r1"
    }

    async fn generate(&self, _params: &CallParams) -> Result<GenerateResult> {
        self.generates.fetch_add(1, Ordering::SeqCst);
        Ok(GenerateResult::new(self.text))
    }

    async fn stream(&self, _params: &CallParams) -> Result<StreamResponse> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        let mut parts: Vec<Result<StreamPart>> = self
            .deltas
            .iter()
            .map(|d| Ok(StreamPart::TextDelta { delta: (*d).into() }))
            .collect();
        parts.push(Ok(StreamPart::Finish {
            finish_reason: FinishReason::Stop,
            usage: None,
        }));
        Ok(StreamResponse::new(
            Box::pin(stream::iter(parts)),
            RawCall::default(),
        ))
    }
}

fn thinking(inner: Arc<ThinkingBackend>) -> ReasoningBackend {
    ReasoningBackend::new(inner, DEFAULT_REASONING_TAG)
}

async fn drain(model: &dyn ModelBackend) -> Vec<StreamPart> {
    model
        .stream(&CallParams::prompt("why?"))
        .await
        .unwrap()
        .stream
        .map(|p| p.unwrap())
        .collect()
        .await
}

fn joined(parts: &[StreamPart], reasoning: bool) -> String {
    parts
        .iter()
        .filter_map(|p| match (p, reasoning) {
            (StreamPart::TextDelta { delta }, false) => Some(delta.as_str()),
            (StreamPart::Reasoning { delta }, true) => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Generate
// ============================================================================

#[tokio::test]
async fn generate_moves_tagged_text_into_reasoning() {
    let inner = Arc::new(ThinkingBackend::new(
        "<think>The user asks why.</think>Because.",
        vec![],
    ));
    let model = thinking(inner);

    let result = model.generate(&CallParams::prompt("why?")).await.unwrap();
    assert_eq!(result.text, "Because.");
    assert_eq!(result.reasoning.as_deref(), Some("The user asks why."));
}

#[tokio::test]
async fn generate_without_tags_is_unchanged() {
    let inner = Arc::new(ThinkingBackend::new("Plain answer, a < b.", vec![]));
    let result = thinking(inner)
        .generate(&CallParams::prompt("why?"))
        .await
        .unwrap();
    assert_eq!(result.text, "Plain answer, a < b.");
    assert!(result.reasoning.is_none());
}

#[tokio::test]
async fn generate_joins_several_sections() {
    let inner = Arc::new(ThinkingBackend::new(
        "A<think>x</think>B<think>y</think>C",
        vec![],
    ));
    let result = thinking(inner)
        .generate(&CallParams::prompt("why?"))
        .await
        .unwrap();
    assert_eq!(result.text, "A\nB\nC");
    assert_eq!(result.reasoning.as_deref(), Some("x\ny"));
}

#[tokio::test]
async fn unclosed_tag_is_left_in_the_text() {
    let inner = Arc::new(ThinkingBackend::new("<think>still going", vec![]));
    let result = thinking(inner)
        .generate(&CallParams::prompt("why?"))
        .await
        .unwrap();
    assert_eq!(result.text, "<think>still going");
    assert!(result.reasoning.is_none());
}

// ============================================================================
// Stream
// ============================================================================

#[tokio::test]
async fn stream_splits_tags_across_deltas() {
    let inner = Arc::new(ThinkingBackend::new(
        "",
        vec!["<thi", "nk>Let me", " think.</th", "ink>The answer", " is 42."],
    ));
    let parts = drain(&thinking(inner)).await;

    assert_eq!(joined(&parts, true), "Let me think.");
    assert_eq!(joined(&parts, false), "The answer is 42.");
    assert!(matches!(parts.last(), Some(StreamPart::Finish { .. })));

    // Reasoning comes first, then text, never interleaved.
    let first_text = parts
        .iter()
        .position(|p| matches!(p, StreamPart::TextDelta { .. }))
        .unwrap();
    assert!(
        parts[first_text..]
            .iter()
            .all(|p| !matches!(p, StreamPart::Reasoning { .. }))
    );
}

#[tokio::test]
async fn held_back_partial_tag_is_released_before_finish() {
    let inner = Arc::new(ThinkingBackend::new("", vec!["x <", "y"]));
    let parts = drain(&thinking(inner)).await;

    assert_eq!(joined(&parts, false), "x <y");
    assert!(matches!(parts.last(), Some(StreamPart::Finish { .. })));
}

// ============================================================================
// Caching and identity
// ============================================================================

#[tokio::test]
async fn extracted_output_is_what_gets_cached() {
    let inner = Arc::new(ThinkingBackend::new(
        "<think>hmm</think>ok",
        vec!["<think>hmm</think>", "ok"],
    ));
    let cached = CachedBackend::new(
        Arc::new(thinking(inner.clone())),
        CacheLayer::new(Arc::new(MemoryStore::default())).with_pacing(ReplayPacing::immediate()),
    );

    for _ in 0..2 {
        let result = cached.generate(&CallParams::prompt("why?")).await.unwrap();
        assert_eq!(result.text, "ok");
        assert_eq!(result.reasoning.as_deref(), Some("hmm"));

        let parts = drain(&cached).await;
        assert_eq!(joined(&parts, true), "hmm");
        assert_eq!(joined(&parts, false), "ok");
    }
    assert_eq!(inner.generates.load(Ordering::SeqCst), 1);
    assert_eq!(inner.streams.load(Ordering::SeqCst), 1);
}

#[test]
fn qualified_id_carries_the_tag() {
    let model = thinking(Arc::new(ThinkingBackend::new("", vec![])));
    assert_eq!(model.provider(), "scripted");
    assert_eq!(model.model_id(), "r1");
    assert_eq!(model.qualified_id(), "scripted:r1#think");
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn fireworks_registers_the_reasoning_alias() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer fw_key"))
        .and(body_partial_json(json!({"model": REASONING_MODEL})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-r1",
            "created": 1_709_296_200,
            "model": REASONING_MODEL,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "<think>\nsmall sum\n</think>\n\n4"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = Mimir::builder()
        .openai("sk-test")
        .fireworks("fw_key")
        .fireworks_base_url(server.uri())
        .build()
        .unwrap();
    assert!(registry.aliases().contains(&REASONING_ALIAS));

    let model = registry.language_model(REASONING_ALIAS).unwrap();
    assert_eq!(model.provider(), "fireworks");
    assert_eq!(
        model.qualified_id(),
        format!("fireworks:{REASONING_MODEL}#think")
    );

    // The second call is answered from the cache.
    for _ in 0..2 {
        let result = model.generate(&CallParams::prompt("2+2?")).await.unwrap();
        assert_eq!(result.text, "\n\n4");
        assert_eq!(result.reasoning.as_deref(), Some("\nsmall sum\n"));
    }
}
