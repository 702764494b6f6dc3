//! Error types for Nauvoo.

use thiserror::Error;

/// Primary error type for all agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error ({server}): {message}")]
    Connection { server: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Malformed arguments for {tool_name}: {message}")]
    MalformedArguments { tool_name: String, message: String },

    #[error("Tool invocation failed: {tool_name}: {message}")]
    ToolInvocation { tool_name: String, message: String },

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Aborted")]
    Aborted,
}

impl AgentError {
    /// Create a connection error for a named provider server.
    pub fn connection(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a tool invocation error.
    pub fn invocation(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Whether this failure is surfaced to the model as tool-result content
    /// instead of crossing the loop boundary.
    pub fn stays_in_conversation(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_)
                | Self::MalformedArguments { .. }
                | Self::ToolInvocation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
