//! Public types for the Mimir API.

mod message;
mod params;
mod request;
mod response;
pub mod timestamp;
mod tool;

pub use message::{ContentPart, Message, MessageContent, Role};
pub use params::{CallParams, ResponseFormat};
pub use request::InvocationRequest;
pub use response::{
    EventStream, FinishReason, GenerateResult, RawCall, ResponseMetadata, StreamPart,
    StreamResponse, Usage,
};
pub use tool::{ToolCall, ToolChoice, ToolDefinition};
