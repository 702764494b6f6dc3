//! Inference gateway contract and implementations.

pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::AgentError;
use crate::types::{Message, StreamChunk, ToolDescriptor};

pub use openai::OpenAiCompatGateway;

/// Tool-selection mode requested from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides whether to call tools.
    #[default]
    Auto,
    /// No tool calls allowed.
    None,
}

/// A request sent to the inference gateway.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Snapshot of the conversation, oldest first.
    pub messages: Vec<Message>,
    /// Full tool catalog, reserved exit tools included.
    pub tools: Vec<ToolDescriptor>,
    pub tool_choice: ToolChoice,
}

/// Streaming chat-completion capability consumed by the turn processor.
///
/// The returned stream is lazy and single-pass: a retry re-runs the whole
/// exchange, it never resumes a chunk stream.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// The model this gateway instance serves.
    fn model_id(&self) -> &str;

    /// Open one streamed exchange.
    async fn stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, AgentError>>, AgentError>;
}
