//! Streaming types.

use serde::{Deserialize, Serialize};

/// A partial tool-call fragment carried by one stream chunk.
///
/// Fragments for the same call are keyed by `id`; `name` arrives with the
/// first fragment and `arguments` text is concatenated across chunks until
/// the stream completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: String,
}

/// Why the stream finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// A chunk emitted by the inference gateway during streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    /// Incremental plain text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Partial tool-call fragments, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragment>,
    /// Set on the final chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    /// A chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
            finish_reason: None,
        }
    }

    /// A chunk carrying tool-call fragments.
    pub fn tool_calls(fragments: Vec<ToolCallFragment>) -> Self {
        Self {
            text: None,
            tool_calls: fragments,
            finish_reason: None,
        }
    }

    /// A terminal chunk.
    pub fn done(reason: FinishReason) -> Self {
        Self {
            text: None,
            tool_calls: Vec::new(),
            finish_reason: Some(reason),
        }
    }

    /// Whether this chunk carries any tool-call intent.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
