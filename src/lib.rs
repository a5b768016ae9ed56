//! Mimir - response caching for LLM calls
//!
//! This crate makes model calls replayable: identical requests (same model,
//! same parameters) are answered from a cache instead of the provider, for
//! both single-shot and streaming calls. A replayed stream emits the exact
//! frames the live one did, in order.
//!
//! The caching layer sits between application code and a [`ModelBackend`].
//! Backends and stores are traits, so the cache works with any provider and
//! any key-value store; an OpenAI-compatible backend, an in-memory store and
//! an on-disk store are included.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use mimir::{CallParams, Mimir, StreamPart};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let registry = Mimir::builder()
//!         .openai("sk-your-key")
//!         .cache_dir("/tmp/mimir-cache")
//!         .build()?;
//!
//!     let model = registry.language_model("chat-model-small")?;
//!     let params = CallParams::prompt("What is the capital of France?");
//!
//!     // First call hits the provider, the second is served from disk.
//!     let first = model.generate(&params).await?;
//!     let second = model.generate(&params).await?;
//!     assert_eq!(first.text, second.text);
//!
//!     let mut stream = model.stream(&params).await?.stream;
//!     while let Some(part) = stream.next().await {
//!         if let StreamPart::TextDelta { delta } = part? {
//!             print!("{delta}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Lower-level use
//!
//! [`cache::CacheLayer`] can wrap any async operation directly, given an
//! [`InvocationRequest`] describing it:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mimir::cache::{CacheLayer, MemoryStore};
//! use mimir::{GenerateResult, InvocationRequest};
//!
//! # async fn example() -> mimir::Result<()> {
//! let layer = CacheLayer::new(Arc::new(MemoryStore::default()));
//! let request = InvocationRequest::new("m1", &serde_json::json!({"prompt": "hi"}))?;
//! let result = layer
//!     .generate_with(&request, || async { Ok(GenerateResult::new("hello")) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod invoice;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use builder::{Mimir, MimirBuilder};
pub use error::{MimirError, Result};
pub use providers::{ModelBackend, ModelRegistry};

pub use types::{
    CallParams, ContentPart, EventStream, FinishReason, GenerateResult, InvocationRequest,
    Message, MessageContent, RawCall, ResponseFormat, ResponseMetadata, Role, StreamPart,
    StreamResponse, ToolCall, ToolChoice, ToolDefinition, Usage,
};

/// Crate version, as published.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
