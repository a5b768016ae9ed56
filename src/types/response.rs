//! Response and streaming event types

use std::fmt;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::timestamp;
use super::tool::ToolCall;
use crate::Result;

/// Provider-side identity of a response.
///
/// Appears on every [`GenerateResult`] and as the `response-metadata` frame of
/// a stream. `timestamp` is the field the cache re-hydrates on replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "timestamp::deserialize_opt"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Non-streaming generation result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub response: ResponseMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl GenerateResult {
    /// A plain text result that stopped normally.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.response.timestamp = Some(timestamp);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.finish_reason = FinishReason::ToolCalls;
        self.tool_calls = tool_calls;
        self
    }
}

/// Events emitted during streaming generation.
///
/// Serialised with a kebab-case `type` tag, which is also the stored form of
/// a captured stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    /// Text content chunk
    TextDelta { delta: String },

    /// Reasoning/thinking content chunk
    Reasoning { delta: String },

    /// Incremental tool call. `id` and `name` arrive on the first delta only.
    ToolCallDelta {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        arguments_delta: String,
    },

    /// A complete tool call
    ToolCall(ToolCall),

    /// Response identity, usually first in the stream
    ResponseMetadata(ResponseMetadata),

    /// Stream complete
    Finish {
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// In-band error reported by the provider
    Error { message: String },
}

/// Boxed stream of parts, as returned by every backend.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamPart>> + Send>>;

/// Side-channel data returned next to a stream: what was actually sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCall {
    #[serde(default)]
    pub raw_prompt: Option<serde_json::Value>,
    #[serde(default)]
    pub raw_settings: serde_json::Map<String, serde_json::Value>,
}

/// A live or replayed stream with its side-channel metadata.
pub struct StreamResponse {
    pub stream: EventStream,
    pub raw_call: RawCall,
}

impl StreamResponse {
    pub fn new(stream: EventStream, raw_call: RawCall) -> Self {
        Self { stream, raw_call }
    }
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("raw_call", &self.raw_call)
            .finish_non_exhaustive()
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

/// Reason the model stopped generating
///
/// Deserialises leniently: provider spellings are mapped and anything
/// unrecognised becomes [`FinishReason::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

impl From<String> for FinishReason {
    fn from(reason: String) -> Self {
        FinishReason::from_provider(&reason)
    }
}

impl FinishReason {
    /// Map an OpenAI-style `finish_reason` string.
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "function_call" | "tool_use" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            _ => FinishReason::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn stream_part_tags_are_kebab_case() {
        let part = StreamPart::TextDelta {
            delta: "hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "text-delta", "delta": "hi"})
        );
    }

    #[test]
    fn metadata_frame_is_flat() {
        let t = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let part = StreamPart::ResponseMetadata(ResponseMetadata {
            id: Some("resp-1".into()),
            model_id: Some("gpt-4o".into()),
            timestamp: Some(t),
        });
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], "response-metadata");
        assert_eq!(value["id"], "resp-1");
        assert!(value["timestamp"].is_string());

        let back: StreamPart = serde_json::from_value(value).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn metadata_frame_accepts_epoch_millis() {
        let t = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let value = json!({
            "type": "response-metadata",
            "timestamp": t.timestamp_millis(),
        });
        let part: StreamPart = serde_json::from_value(value).unwrap();
        match part {
            StreamPart::ResponseMetadata(meta) => assert_eq!(meta.timestamp, Some(t)),
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn unknown_finish_reason_maps_to_other() {
        let r: FinishReason = serde_json::from_value(json!("something_new")).unwrap();
        assert_eq!(r, FinishReason::Other);
        assert_eq!(FinishReason::from_provider("tool_calls"), FinishReason::ToolCalls);
    }

    #[test]
    fn generate_result_defaults_missing_fields() {
        let r: GenerateResult = serde_json::from_value(json!({"text": "hello"})).unwrap();
        assert_eq!(r.text, "hello");
        assert_eq!(r.finish_reason, FinishReason::Stop);
        assert!(r.response.timestamp.is_none());
    }
}
