//! The backend capability every model implementation provides.
//!
//! Backends are consumed as `Arc<dyn ModelBackend>`, so decorators such as
//! [`CachedBackend`](super::CachedBackend) can wrap any implementation and
//! stand in for it unchanged.
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl ModelBackend for Echo {
//!     fn provider(&self) -> &str { "echo" }
//!     fn model_id(&self) -> &str { "echo-1" }
//!
//!     async fn generate(&self, params: &CallParams) -> Result<GenerateResult> {
//!         let last = params.messages.last().and_then(|m| m.content.as_text());
//!         Ok(GenerateResult::new(last.unwrap_or_default()))
//!     }
//!
//!     async fn stream(&self, params: &CallParams) -> Result<StreamResponse> {
//!         // ...
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{CallParams, GenerateResult, StreamResponse};

/// A language model that can answer single-shot and streaming calls.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Provider name for logging/debugging (e.g. `"openai"`).
    fn provider(&self) -> &str;

    /// Upstream model identifier (e.g. `"gpt-4o-mini"`).
    fn model_id(&self) -> &str;

    /// Globally unique identity, `"{provider}:{model_id}"`.
    ///
    /// Cache keys are derived from this, so two backends that would answer
    /// the same call differently must not share it.
    fn qualified_id(&self) -> String {
        format!("{}:{}", self.provider(), self.model_id())
    }

    /// Produce a complete response.
    async fn generate(&self, params: &CallParams) -> Result<GenerateResult>;

    /// Produce a response incrementally.
    ///
    /// An `Err` here means the call never started; failures after the first
    /// frame arrive as `Err` items on the stream.
    async fn stream(&self, params: &CallParams) -> Result<StreamResponse>;
}
