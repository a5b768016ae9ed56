//! OpenAI-compatible chat completions client.
//!
//! Speaks the `/chat/completions` protocol that OpenAI, OpenRouter, Ollama,
//! vLLM and most hosted gateways implement, in both single-shot and SSE
//! streaming form.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt, stream};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::sse;
use super::traits::ModelBackend;
use crate::telemetry::{self, OP_GENERATE, OP_STREAM};
use crate::types::{
    CallParams, ContentPart, FinishReason, GenerateResult, Message, MessageContent, RawCall,
    ResponseFormat, ResponseMetadata, Role, StreamPart, StreamResponse, ToolCall, ToolChoice,
    Usage,
};
use crate::{MimirError, Result};

/// Default base URL for the OpenAI API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible endpoint of Fireworks AI
pub const FIREWORKS_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Provider name reported by backends on the default endpoint
pub const DEFAULT_PROVIDER: &str = "openai";

/// Connection settings shared by every model on one endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Name used in qualified ids, logs and metric labels.
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_owned(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Point at another compatible endpoint (or a wiremock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Report a different provider name, e.g. `"fireworks"`.
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider = name.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Build an HTTP client with this config's timeout.
    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// A single model behind an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiBackend {
    http: Client,
    provider: String,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Create a backend with its own HTTP client.
    pub fn new(config: &OpenAiConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(config.http_client()?, config, model))
    }

    /// Create a backend sharing an existing HTTP client (and its pool).
    pub fn with_client(http: Client, config: &OpenAiConfig, model: impl Into<String>) -> Self {
        Self {
            http,
            provider: config.provider.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: model.into(),
        }
    }

    /// The JSON body for one call.
    fn request_body(&self, params: &CallParams, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(params.messages.len() + 1);
        if let Some(system) = &params.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(params.messages.iter().map(message_json));

        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert("messages".into(), Value::Array(messages));
        if let Some(t) = params.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(max) = params.max_tokens {
            body.insert("max_tokens".into(), json!(max));
        }
        if let Some(p) = params.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if let Some(seed) = params.seed {
            body.insert("seed".into(), json!(seed));
        }
        if !params.stop.is_empty() {
            body.insert("stop".into(), json!(params.stop));
        }
        if !params.tools.is_empty() {
            let tools: Vec<Value> = params
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(tools));
        }
        if let Some(choice) = &params.tool_choice {
            body.insert("tool_choice".into(), tool_choice_json(choice));
        }
        if let Some(format) = &params.response_format {
            body.insert("response_format".into(), response_format_json(format));
        }
        if stream {
            body.insert("stream".into(), json!(true));
            body.insert("stream_options".into(), json!({"include_usage": true}));
        }
        if let Some(Value::Object(extra)) = &params.provider_options {
            for (k, v) in extra {
                body.insert(k.clone(), v.clone());
            }
        }
        Value::Object(body)
    }

    async fn post(&self, body: &Value) -> Result<Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        self.check_status(response).await
    }

    async fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status.as_u16() {
            401 | 403 => Err(MimirError::AuthenticationFailed),
            404 => Err(MimirError::ModelNotFound(self.model.clone())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(MimirError::RateLimited { retry_after })
            }
            code => {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| {
                        if text.is_empty() {
                            status.to_string()
                        } else {
                            text
                        }
                    });
                Err(MimirError::Api {
                    status: code,
                    message,
                })
            }
        }
    }

    fn record_request(&self, operation: &'static str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::BACKEND_REQUESTS_TOTAL,
            "provider" => self.provider.clone(),
            "operation" => operation,
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::BACKEND_REQUEST_DURATION_SECONDS,
            "provider" => self.provider.clone(),
            "operation" => operation,
        )
        .record(start.elapsed().as_secs_f64());
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, params), fields(provider = %self.provider, model = %self.model))]
    async fn generate(&self, params: &CallParams) -> Result<GenerateResult> {
        let start = Instant::now();
        let body = self.request_body(params, false);

        let result = async {
            let completion: ApiCompletion = self.post(&body).await?.json().await?;
            completion.into_result()
        }
        .await;

        self.record_request(OP_GENERATE, start, result.is_ok());
        result
    }

    #[instrument(skip(self, params), fields(provider = %self.provider, model = %self.model))]
    async fn stream(&self, params: &CallParams) -> Result<StreamResponse> {
        let start = Instant::now();
        let body = self.request_body(params, true);

        let response = self.post(&body).await;
        self.record_request(OP_STREAM, start, response.is_ok());
        let response = response?;
        debug!("stream opened");

        let raw_call = raw_call(body);
        let payloads = Box::pin(sse::data_payloads(Box::pin(response.bytes_stream())));
        Ok(StreamResponse::new(
            Box::pin(decode_stream(payloads)),
            raw_call,
        ))
    }
}

// ============================================================================
// Request encoding
// ============================================================================

fn message_json(message: &Message) -> Value {
    let mut out = Map::new();
    let role = match &message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool { tool_call_id } => {
            out.insert("tool_call_id".into(), json!(tool_call_id));
            "tool"
        }
    };
    out.insert("role".into(), json!(role));

    let content = match &message.content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => Value::Array(parts.iter().map(content_part_json).collect()),
    };
    out.insert("content".into(), content);

    if let Some(calls) = &message.tool_calls
        && !calls.is_empty()
    {
        let calls: Vec<Value> = calls
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": "function",
                    "function": {"name": c.name, "arguments": c.arguments},
                })
            })
            .collect();
        out.insert("tool_calls".into(), Value::Array(calls));
    }
    Value::Object(out)
}

fn content_part_json(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({"type": "text", "text": text}),
        ContentPart::Image { url } => json!({"type": "image_url", "image_url": {"url": url}}),
        ContentPart::File { media_type, data } => json!({
            "type": "file",
            "file": {"file_data": format!("data:{media_type};base64,{data}")},
        }),
    }
}

fn tool_choice_json(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Function { name } => json!({"type": "function", "function": {"name": name}}),
    }
}

fn response_format_json(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({"type": "text"}),
        ResponseFormat::JsonObject => json!({"type": "json_object"}),
        ResponseFormat::JsonSchema { name, schema } => json!({
            "type": "json_schema",
            "json_schema": {"name": name, "schema": schema},
        }),
    }
}

/// Split a request body into the prompt and the remaining settings.
fn raw_call(body: Value) -> RawCall {
    let Value::Object(mut settings) = body else {
        return RawCall::default();
    };
    let raw_prompt = settings.remove("messages");
    RawCall {
        raw_prompt,
        raw_settings: settings,
    }
}

// ============================================================================
// Response decoding
// ============================================================================

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ApiCompletion {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
    completion_tokens_details: Option<ApiCompletionDetails>,
}

#[derive(Deserialize)]
struct ApiCompletionDetails {
    reasoning_tokens: Option<u32>,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            reasoning_tokens: u.completion_tokens_details.and_then(|d| d.reasoning_tokens),
        }
    }
}

fn epoch_seconds(created: Option<i64>) -> Option<DateTime<Utc>> {
    created.and_then(|secs| DateTime::from_timestamp(secs, 0))
}

impl ApiCompletion {
    fn into_result(self) -> Result<GenerateResult> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or(MimirError::EmptyResponse)?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
            .collect();

        Ok(GenerateResult {
            text: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content,
            tool_calls,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or_default(),
            usage: self.usage.map(Usage::from),
            response: ResponseMetadata {
                id: self.id,
                model_id: self.model,
                timestamp: epoch_seconds(self.created),
            },
            warnings: Vec::new(),
        })
    }
}

#[derive(Deserialize)]
struct ApiChunk {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<ApiChunkChoice>,
    usage: Option<ApiUsage>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiChunkChoice {
    #[serde(default)]
    delta: ApiDelta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct ApiDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<ApiToolCallDelta>>,
}

#[derive(Deserialize)]
struct ApiToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<ApiFunctionDelta>,
}

#[derive(Deserialize)]
struct ApiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Turns completion chunks into parts.
///
/// The first chunk yields a `response-metadata` part; the finish reason and
/// usage are held back and emitted as a single `finish` part once the
/// stream ends, since providers spread them over the last two chunks.
#[derive(Default)]
struct ChunkDecoder {
    metadata_sent: bool,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl ChunkDecoder {
    fn decode(&mut self, chunk: ApiChunk) -> Result<Vec<StreamPart>> {
        if let Some(error) = chunk.error {
            return Err(MimirError::Stream(error.message));
        }

        let mut parts = Vec::new();
        if !self.metadata_sent {
            self.metadata_sent = true;
            parts.push(StreamPart::ResponseMetadata(ResponseMetadata {
                id: chunk.id,
                model_id: chunk.model,
                timestamp: epoch_seconds(chunk.created),
            }));
        }

        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(text) = delta.reasoning_content
                && !text.is_empty()
            {
                parts.push(StreamPart::Reasoning { delta: text });
            }
            if let Some(text) = delta.content
                && !text.is_empty()
            {
                parts.push(StreamPart::TextDelta { delta: text });
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                parts.push(StreamPart::ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments_delta: arguments,
                });
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(FinishReason::from_provider(&reason));
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }
        Ok(parts)
    }

    fn finish(&mut self) -> StreamPart {
        StreamPart::Finish {
            finish_reason: self.finish_reason.take().unwrap_or_default(),
            usage: self.usage.take(),
        }
    }
}

struct DecodeState<S> {
    payloads: S,
    decoder: ChunkDecoder,
    pending: VecDeque<StreamPart>,
    ended: bool,
}

/// Decode SSE payloads into parts, closing with one `finish` part.
///
/// A transport error or an in-band provider error is forwarded as `Err`
/// and ends the stream without a `finish` part.
fn decode_stream<S>(payloads: S) -> impl Stream<Item = Result<StreamPart>> + Send
where
    S: Stream<Item = Result<String>> + Send + Unpin,
{
    let state = DecodeState {
        payloads,
        decoder: ChunkDecoder::default(),
        pending: VecDeque::new(),
        ended: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(part) = state.pending.pop_front() {
                return Some((Ok(part), state));
            }
            if state.ended {
                return None;
            }
            match state.payloads.next().await {
                Some(Ok(payload)) => {
                    let decoded = serde_json::from_str::<ApiChunk>(&payload)
                        .map_err(|e| MimirError::Stream(format!("malformed chunk: {e}")))
                        .and_then(|chunk| state.decoder.decode(chunk));
                    match decoded {
                        Ok(parts) => state.pending.extend(parts),
                        Err(e) => {
                            state.ended = true;
                            return Some((Err(e), state));
                        }
                    }
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.ended = true;
                    state.pending.push_back(state.decoder.finish());
                }
            }
        }
    })
}
