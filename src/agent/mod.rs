//! Agent front door: configuration, tool loading, and the run loop.

pub mod conversation;
pub mod runner;
pub mod turn;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::gateway::{InferenceGateway, OpenAiCompatGateway};
use crate::mcp::{McpToolRouter, SessionManager, ToolRegistry, ToolRouter};

pub use conversation::Conversation;
pub use runner::{AgentLoop, LoopState, RunId, RunSummary, TerminationReason};
pub use turn::{TurnEvent, TurnEventSink, TurnOptions, TurnOutcome, TurnProcessor};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// An agent that connects tool providers, holds a conversation, and drives
/// the loop to termination.
pub struct Agent {
    config: AgentConfig,
    gateway: Arc<dyn InferenceGateway>,
    router: Arc<McpToolRouter>,
    conversation: Conversation,
    event_sink: Option<TurnEventSink>,
}

impl Agent {
    /// Create an agent with an OpenAI-compatible gateway built from the
    /// configuration. No providers are connected until [`Agent::load_tools`]
    /// runs; until then the catalog holds only the reserved exit tools.
    pub fn new(config: AgentConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let api_key = config.api_key.clone().unwrap_or_default();
        let gateway = Arc::new(OpenAiCompatGateway::new(&config.model, api_key, base_url));
        Self::with_gateway(config, gateway)
    }

    /// Create an agent over an explicit gateway implementation.
    pub fn with_gateway(config: AgentConfig, gateway: Arc<dyn InferenceGateway>) -> Self {
        let conversation = Conversation::with_system_prompt(config.system_prompt.as_deref());
        Self {
            config,
            gateway,
            router: Arc::new(McpToolRouter::new(ToolRegistry::new(), SessionManager::new())),
            conversation,
            event_sink: None,
        }
    }

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Connect every configured provider and build the unified catalog.
    ///
    /// Connections fan out in parallel; tools land in the registry in
    /// server-list order, so the catalog is deterministic regardless of
    /// connection timing. Returns the number of provider tools registered.
    pub async fn load_tools(&mut self) -> Result<usize, AgentError> {
        let mut sessions = SessionManager::new();
        let ids = sessions
            .connect_all(&self.config.servers, self.config.connect_policy)
            .await?;

        let mut registry = ToolRegistry::new();
        for id in ids {
            let session = sessions
                .session(id)
                .ok_or_else(|| AgentError::Configuration("session vanished during load".into()))?;
            for tool in session.tools() {
                registry.register(tool.clone(), id);
            }
        }

        let count = registry.len();
        info!(
            providers = sessions.len(),
            tools = count,
            "tool catalog loaded"
        );
        self.router = Arc::new(McpToolRouter::new(registry, sessions));
        Ok(count)
    }

    /// Append a user message and run the loop to termination.
    pub async fn run(
        &mut self,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, AgentError> {
        self.conversation.push(crate::types::Message::user(prompt));

        let mut processor = TurnProcessor::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.router) as Arc<dyn ToolRouter>,
        );
        if let Some(sink) = &self.event_sink {
            processor = processor.with_event_sink(Arc::clone(sink));
        }

        let agent_loop = AgentLoop::new(processor, self.config.max_turns)
            .with_expect_tool(self.config.expect_tool);
        agent_loop.run(&mut self.conversation, cancel).await
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Full catalog as it will be sent to the gateway.
    pub fn catalog(&self) -> Vec<crate::types::ToolDescriptor> {
        self.router.catalog()
    }

    /// Tear down provider sessions. The agent stays usable for plain
    /// (tool-free) runs afterwards.
    pub fn shutdown(&self) {
        self.router.shutdown();
    }
}
