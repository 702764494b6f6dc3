//! Core data model: messages, tool descriptors, stream chunks.

pub mod message;
pub mod stream;
pub mod tool;

pub use message::{Message, Role, ToolCall};
pub use stream::{FinishReason, StreamChunk, ToolCallFragment};
pub use tool::ToolDescriptor;
