//! Provider sessions over MCP child-process transports.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use rmcp::{
    model::{
        CallToolRequestParams, CallToolResult, ClientInfo, Content, JsonObject, ProtocolVersion,
    },
    service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceError, ServiceExt},
    transport::TokioChildProcess,
};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ConnectPolicy;
use crate::error::AgentError;
use crate::types::ToolDescriptor;

type DynClientService = Box<dyn DynService<RoleClient>>;
pub type ProviderRunningService = RunningService<RoleClient, DynClientService>;

/// How to reach one tool-provider process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Environment subset applied on top of the inherited environment.
    pub env: HashMap<String, String>,
}

impl ServerSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Opaque registry-facing handle to one connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub(crate) usize);

/// One connected provider: the running rmcp service plus the tools it
/// announced at discovery time.
pub struct ProviderSession {
    server: String,
    service: ProviderRunningService,
    tools: Vec<ToolDescriptor>,
}

impl ProviderSession {
    /// Spawn the provider process, run the initialize handshake, and list
    /// its tools.
    pub async fn connect(spec: &ServerSpec) -> Result<Self, AgentError> {
        let mut command = Command::new(&spec.command);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let transport = TokioChildProcess::new(command)
            .map_err(|e| AgentError::connection(&spec.command, format!("spawn failed: {e}")))?;

        let client_info = ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            ..Default::default()
        };
        let service = client_info
            .into_dyn()
            .serve(transport)
            .await
            .map_err(|e| map_initialize_error(&spec.command, e))?;

        let tools = match service.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => {
                let page = service
                    .list_tools(None)
                    .await
                    .map_err(|e| map_service_error(&spec.command, "list_tools", e))?;
                page.tools
            }
            Err(e) => return Err(map_service_error(&spec.command, "list_tools", e)),
        };

        let tools = tools.into_iter().map(map_tool_descriptor).collect::<Vec<_>>();
        debug!(server = %spec.command, tools = tools.len(), "provider connected");

        Ok(Self {
            server: spec.command.clone(),
            service,
            tools,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Tools announced by this provider, in discovery order.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Invoke a tool, surfacing only the first content block's text.
    ///
    /// Richer content blocks (images, resources, anything past block 0) are
    /// dropped.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, AgentError> {
        let arguments = coerce_tool_arguments(name, arguments)?;

        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error(&self.server, "call_tool", e))?;

        map_call_result(name, result)
    }

    /// Release the transport and the child process.
    pub fn disconnect(&self) {
        self.service.cancellation_token().cancel();
    }
}

/// Owns connections to tool-provider processes.
#[derive(Default)]
pub struct SessionManager {
    sessions: Vec<Arc<ProviderSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect one provider and take ownership of its session.
    pub async fn connect(&mut self, spec: &ServerSpec) -> Result<SessionId, AgentError> {
        let session = ProviderSession::connect(spec).await?;
        self.sessions.push(Arc::new(session));
        Ok(SessionId(self.sessions.len() - 1))
    }

    /// Connect every provider with parallel fan-out, then adopt the results
    /// in original server-list order so downstream registration stays
    /// deterministic even when connections complete out of order.
    ///
    /// A failed provider is skipped (`BestEffort`) or aborts the whole load
    /// step (`FailFast`); it never prevents sibling connections from being
    /// attempted.
    pub async fn connect_all(
        &mut self,
        specs: &[ServerSpec],
        policy: ConnectPolicy,
    ) -> Result<Vec<SessionId>, AgentError> {
        let results = future::join_all(specs.iter().map(ProviderSession::connect)).await;

        let mut ids = Vec::with_capacity(specs.len());
        for (spec, result) in specs.iter().zip(results) {
            match result {
                Ok(session) => {
                    self.sessions.push(Arc::new(session));
                    ids.push(SessionId(self.sessions.len() - 1));
                }
                Err(e) if policy == ConnectPolicy::BestEffort => {
                    warn!(server = %spec.command, error = %e, "provider skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ids)
    }

    pub fn session(&self, id: SessionId) -> Option<&Arc<ProviderSession>> {
        self.sessions.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Dispatch an invocation to the session that owns the tool.
    pub async fn invoke(
        &self,
        id: SessionId,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, AgentError> {
        let session = self
            .session(id)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_owned()))?;
        session.invoke(name, arguments).await
    }

    /// Tear down every session. Called at shutdown; invocations issued
    /// afterwards fail with a connection error.
    pub fn disconnect_all(&self) {
        for session in &self.sessions {
            debug!(server = %session.server(), "provider disconnected");
            session.disconnect();
        }
    }
}

fn map_tool_descriptor(tool: rmcp::model::Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
        parameters: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn coerce_tool_arguments(
    tool_name: &str,
    value: serde_json::Value,
) -> Result<Option<JsonObject>, AgentError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        other => Err(AgentError::MalformedArguments {
            tool_name: tool_name.to_owned(),
            message: format!("arguments must be a JSON object; got {other}"),
        }),
    }
}

fn first_text_block(content: &[Content]) -> Option<String> {
    content
        .first()
        .and_then(|block| block.as_text())
        .map(|text| text.text.clone())
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<String, AgentError> {
    let text = first_text_block(&result.content);
    if result.content.len() > 1 {
        debug!(tool = name, blocks = result.content.len(), "extra content blocks dropped");
    }

    if result.is_error.unwrap_or(false) {
        let message = result
            .structured_content
            .as_ref()
            .map(|v| v.to_string())
            .or(text)
            .unwrap_or_else(|| "tool returned an error result".into());
        return Err(AgentError::invocation(name, message));
    }

    Ok(text.unwrap_or_default())
}

fn map_initialize_error(server: &str, error: ClientInitializeError) -> AgentError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            AgentError::connection(server, format!("initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => {
            AgentError::connection(server, format!("initialize transport error ({context}): {error}"))
        }
        ClientInitializeError::JsonRpcError(error) => AgentError::connection(
            server,
            format!("initialize JSON-RPC error {}: {}", error.code.0, error.message),
        ),
        ClientInitializeError::Cancelled => {
            AgentError::connection(server, "initialize cancelled")
        }
        other => AgentError::connection(server, format!("initialize error: {other}")),
    }
}

fn map_service_error(server: &str, context: &str, error: ServiceError) -> AgentError {
    match error {
        ServiceError::McpError(error) => AgentError::invocation(
            context,
            format!("MCP error {}: {}", error.code.0, error.message),
        ),
        ServiceError::TransportSend(error) => {
            AgentError::connection(server, format!("{context}: transport send failed: {error}"))
        }
        ServiceError::TransportClosed => {
            AgentError::connection(server, format!("{context}: transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            AgentError::invocation(context, "unexpected MCP response")
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            AgentError::invocation(context, format!("request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => {
            AgentError::invocation(context, format!("timed out after {}ms", timeout.as_millis()))
        }
        other => AgentError::invocation(context, format!("MCP service error: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_tool_arguments_accepts_object_and_null() {
        let from_obj = coerce_tool_arguments("lookup", json!({"city":"nyc"}))
            .expect("object arguments should pass")
            .expect("object should be present");
        assert_eq!(from_obj.get("city"), Some(&json!("nyc")));

        let from_null = coerce_tool_arguments("lookup", serde_json::Value::Null)
            .expect("null arguments should pass");
        assert!(from_null.is_none());
    }

    #[test]
    fn coerce_tool_arguments_rejects_non_object() {
        let err = coerce_tool_arguments("lookup", json!(["bad"]))
            .expect_err("array arguments should be rejected");
        assert!(matches!(
            err,
            AgentError::MalformedArguments { tool_name, .. } if tool_name == "lookup"
        ));
    }

    #[test]
    fn map_call_result_surfaces_only_first_text_block() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "first block" },
                { "type": "text", "text": "second block" }
            ],
            "isError": false
        }))
        .expect("fixture call result should deserialize");

        let text = map_call_result("lookup", result).expect("result should map to text");
        assert_eq!(text, "first block");
    }

    #[test]
    fn map_call_result_error_payload_maps_to_invocation_error() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "tool failed at runtime" }
            ],
            "isError": true
        }))
        .expect("fixture call result should deserialize");

        let err = map_call_result("lookup", result)
            .expect_err("error result should map to invocation error");
        assert!(matches!(
            err,
            AgentError::ToolInvocation { tool_name, message }
            if tool_name == "lookup" && message.contains("tool failed at runtime")
        ));
    }

    #[test]
    fn map_call_result_without_text_yields_empty_string() {
        // rmcp's Deserialize impl rejects empty content, so build the value directly.
        let result = CallToolResult {
            content: vec![],
            structured_content: None,
            is_error: Some(false),
            meta: None,
        };

        assert_eq!(map_call_result("lookup", result).expect("ok result"), "");
    }

    #[test]
    fn map_service_error_transport_closed_is_a_connection_error() {
        let err = map_service_error("files", "call_tool", ServiceError::TransportClosed);
        assert!(matches!(
            err,
            AgentError::Connection { server, message }
            if server == "files" && message.contains("transport closed")
        ));
    }

    #[test]
    fn server_spec_env_overlays_inherited_environment() {
        let spec = ServerSpec::new("node", vec!["server.js".into()]).with_env("PATH", "/usr/bin");
        assert_eq!(spec.env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(spec.args, vec!["server.js".to_string()]);
    }
}
