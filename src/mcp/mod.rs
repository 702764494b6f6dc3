//! Tool-provider multiplexing: sessions, registry, and routing.

pub mod registry;
pub mod session;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::ToolDescriptor;

pub use registry::{
    exit_tool_descriptors, is_exit_tool, ToolRegistry, ASK_QUESTION, EXIT_TOOLS, TASK_COMPLETE,
};
pub use session::{ProviderSession, ServerSpec, SessionId, SessionManager};

/// Dispatch seam the turn processor drives: a unified catalog plus
/// name-routed invocation.
#[async_trait]
pub trait ToolRouter: Send + Sync {
    /// Full catalog used for generation, exit tools included.
    fn catalog(&self) -> Vec<ToolDescriptor>;

    /// Route an invocation to whichever session registered the name.
    async fn dispatch(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, AgentError>;
}

/// Routes calls through the registry to MCP sessions.
pub struct McpToolRouter {
    registry: ToolRegistry,
    sessions: SessionManager,
}

impl McpToolRouter {
    pub fn new(registry: ToolRegistry, sessions: SessionManager) -> Self {
        Self { registry, sessions }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Tear down every owned session.
    pub fn shutdown(&self) {
        self.sessions.disconnect_all();
    }
}

#[async_trait]
impl ToolRouter for McpToolRouter {
    fn catalog(&self) -> Vec<ToolDescriptor> {
        self.registry.catalog()
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, AgentError> {
        let session = self
            .registry
            .lookup(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_owned()))?;
        self.sessions.invoke(session, name, arguments).await
    }
}
