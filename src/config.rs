//! Agent configuration (code > env).

use crate::error::AgentError;
use crate::mcp::ServerSpec;

/// What to do when an individual provider fails to connect during the load
/// step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectPolicy {
    /// Skip the failed provider and run with the remaining tool set.
    #[default]
    BestEffort,
    /// Abort the whole load step on the first failure.
    FailFast,
}

/// Configuration consumed at the agent boundary.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier sent to the gateway.
    pub model: String,
    /// Base URL of the OpenAI-compatible gateway.
    pub base_url: Option<String>,
    /// Gateway credential.
    pub api_key: Option<String>,
    /// Optional system-prompt override.
    pub system_prompt: Option<String>,
    /// Tool-provider processes to connect at load time.
    pub servers: Vec<ServerSpec>,
    /// Maximum number of processed turns per run.
    pub max_turns: usize,
    /// Whether the loop is primed to expect tool activity up front.
    pub expect_tool: bool,
    pub connect_policy: ConnectPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            base_url: None,
            api_key: None,
            system_prompt: None,
            servers: Vec::new(),
            max_turns: 10,
            expect_tool: true,
            connect_policy: ConnectPolicy::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Load from environment variables (NAUVOO_MODEL, NAUVOO_API_KEY, ...).
    pub fn from_env() -> Result<Self, AgentError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let model = std::env::var("NAUVOO_MODEL")
            .map_err(|_| AgentError::Configuration("Missing NAUVOO_MODEL".into()))?;

        let mut config = Self::new(model);
        if let Ok(url) = std::env::var("NAUVOO_BASE_URL") {
            config.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("NAUVOO_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(prompt) = std::env::var("NAUVOO_SYSTEM_PROMPT") {
            config.system_prompt = Some(prompt);
        }
        if let Ok(raw) = std::env::var("NAUVOO_MAX_TURNS") {
            config.max_turns = raw.parse().map_err(|_| {
                AgentError::Configuration(format!("NAUVOO_MAX_TURNS is not a number: {raw}"))
            })?;
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_server(mut self, spec: ServerSpec) -> Self {
        self.servers.push(spec);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_expect_tool(mut self, expect_tool: bool) -> Self {
        self.expect_tool = expect_tool;
        self
    }

    pub fn with_connect_policy(mut self, policy: ConnectPolicy) -> Self {
        self.connect_policy = policy;
        self
    }
}
