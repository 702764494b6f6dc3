//! Nauvoo — a tool-orchestrating agent loop over MCP providers.
//!
//! Connects to tool-provider subprocesses over the Model Context Protocol,
//! multiplexes their tools into one catalog, and drives a streamed
//! conversation loop against an OpenAI-compatible inference gateway until
//! the task terminates (exit tool, convergence, or turn budget).
//!
//! # Quick Start
//!
//! ```no_run
//! use nauvoo::agent::Agent;
//! use nauvoo::config::AgentConfig;
//! use nauvoo::mcp::ServerSpec;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), nauvoo::error::AgentError> {
//! let config = AgentConfig::from_env()?
//!     .with_server(ServerSpec::new("npx", vec!["some-mcp-server".into()]));
//!
//! let mut agent = Agent::new(config);
//! agent.load_tools().await?;
//!
//! let summary = agent.run("count the files in /tmp", &CancellationToken::new()).await?;
//! println!("terminated after {} turns: {:?}", summary.turns, summary.reason);
//! agent.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod types;

pub use agent::Agent;
pub use config::AgentConfig;
pub use error::AgentError;
