//! Model backends.
//!
//! [`ModelBackend`] is the capability every model implements. This module
//! provides one HTTP implementation ([`OpenAiBackend`]), two decorators
//! ([`CachedBackend`] and [`ReasoningBackend`]) and the alias registry
//! ([`ModelRegistry`]).

mod cached;
pub mod openai;
mod reasoning;
pub mod registry;
mod sse;
mod traits;

pub use cached::CachedBackend;
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use reasoning::{DEFAULT_REASONING_TAG, ReasoningBackend};
pub use registry::{
    DEFAULT_ALIASES, DEFAULT_MODEL_ALIAS, ModelRegistry, REASONING_ALIAS, REASONING_MODEL,
};
pub use traits::ModelBackend;
