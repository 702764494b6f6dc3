//! OpenAI-compatible chat-completions gateway.

use std::sync::OnceLock;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::debug;

use crate::error::AgentError;
use crate::types::{FinishReason, Message, Role, StreamChunk, ToolCallFragment};

use super::{ChatRequest, InferenceGateway, ToolChoice};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Build default headers for a Bearer-token API.
fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

fn status_to_error(status: u16, body: &str) -> AgentError {
    AgentError::Gateway(format!("chat completion failed (status {status}): {body}"))
}

/// Streaming gateway for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatGateway {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatGateway {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let messages = request
            .messages
            .iter()
            .map(message_to_wire)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        let obj = body.as_object_mut().expect("body is an object");

        if !request.tools.is_empty() && request.tool_choice == ToolChoice::Auto {
            let tool_defs: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
            obj.insert("tool_choice".into(), "auto".into());
        }

        body
    }
}

#[async_trait]
impl InferenceGateway for OpenAiCompatGateway {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, AgentError>>, AgentError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, "gateway stream request");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            // Wire tool-call deltas carry an index; only the first delta of a
            // call carries its id. Resolve index -> id so downstream
            // accumulation can stay id-keyed.
            let mut ids_by_index: Vec<String> = Vec::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(AgentError::Network(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = parse_sse_data(&line) {
                        match serde_json::from_str::<WireStreamChunk>(data) {
                            Ok(chunk) => {
                                if let Some(choice) = chunk.choices.into_iter().next() {
                                    yield Ok(map_wire_choice(choice, &mut ids_by_index));
                                }
                            }
                            Err(_) => {} // skip unparseable chunks
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn map_wire_choice(choice: WireStreamChoice, ids_by_index: &mut Vec<String>) -> StreamChunk {
    let mut fragments = Vec::new();
    for delta in choice.delta.tool_calls.unwrap_or_default() {
        while ids_by_index.len() <= delta.index {
            ids_by_index.push(format!("call_{}", ids_by_index.len()));
        }
        if let Some(id) = delta.id {
            ids_by_index[delta.index] = id;
        }
        let function = delta.function.unwrap_or_default();
        fragments.push(ToolCallFragment {
            id: ids_by_index[delta.index].clone(),
            name: function.name,
            arguments: function.arguments.unwrap_or_default(),
        });
    }

    StreamChunk {
        text: choice.delta.content.filter(|t| !t.is_empty()),
        tool_calls: fragments,
        finish_reason: choice.finish_reason.as_deref().and_then(parse_finish_reason),
    }
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn message_to_wire(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    if msg.role == Role::Tool {
        return serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.content,
        });
    }

    if !msg.tool_calls.is_empty() {
        let tool_calls: Vec<serde_json::Value> = msg
            .tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments,
                    }
                })
            })
            .collect();
        return serde_json::json!({
            "role": role,
            "content": if msg.content.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(msg.content.clone())
            },
            "tool_calls": tool_calls,
        });
    }

    serde_json::json!({ "role": role, "content": msg.content })
}

// Wire response types (internal)

#[derive(Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireStreamChoice>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize, Default)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolCall, ToolDescriptor};

    #[test]
    fn parse_sse_data_strips_prefix_and_drops_done() {
        assert_eq!(parse_sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_data("data: [DONE]"), None);
        assert_eq!(parse_sse_data("event: ping"), None);
    }

    #[test]
    fn tool_result_message_maps_to_tool_role_with_correlation_id() {
        let wire = message_to_wire(&Message::tool_result("call_7", "lookup", "42"));
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_7");
        assert_eq!(wire["content"], "42");
    }

    #[test]
    fn assistant_tool_call_message_keeps_raw_arguments() {
        let msg = Message::assistant_tool_calls(
            "",
            vec![ToolCall {
                id: "call_1".into(),
                name: "lookup".into(),
                arguments: r#"{"q":"rust"}"#.into(),
            }],
        );
        let wire = message_to_wire(&msg);
        assert_eq!(wire["content"], serde_json::Value::Null);
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], r#"{"q":"rust"}"#);
    }

    #[test]
    fn request_body_includes_catalog_with_auto_tool_choice() {
        let gateway = OpenAiCompatGateway::new("test-model", "key", "http://localhost");
        let body = gateway.build_request_body(&ChatRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDescriptor::no_args("task_complete", "signal completion")],
            tool_choice: ToolChoice::Auto,
        });
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "task_complete");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn wire_choice_resolves_fragment_ids_across_deltas() {
        let mut ids = Vec::new();

        let first: WireStreamChoice = serde_json::from_value(serde_json::json!({
            "delta": {
                "tool_calls": [
                    { "index": 0, "id": "call_abc", "function": { "name": "lookup", "arguments": "{\"q\":" } }
                ]
            },
            "finish_reason": null
        }))
        .expect("wire chunk should deserialize");
        let chunk = map_wire_choice(first, &mut ids);
        assert_eq!(chunk.tool_calls[0].id, "call_abc");
        assert_eq!(chunk.tool_calls[0].name.as_deref(), Some("lookup"));

        // Follow-up deltas omit the id; the index mapping fills it in.
        let second: WireStreamChoice = serde_json::from_value(serde_json::json!({
            "delta": {
                "tool_calls": [
                    { "index": 0, "function": { "arguments": "\"rust\"}" } }
                ]
            },
            "finish_reason": null
        }))
        .expect("wire chunk should deserialize");
        let chunk = map_wire_choice(second, &mut ids);
        assert_eq!(chunk.tool_calls[0].id, "call_abc");
        assert_eq!(chunk.tool_calls[0].arguments, "\"rust\"}");
    }

    #[test]
    fn finish_reason_maps_known_values() {
        assert_eq!(parse_finish_reason("stop"), Some(FinishReason::Stop));
        assert_eq!(parse_finish_reason("tool_calls"), Some(FinishReason::ToolCalls));
        assert_eq!(parse_finish_reason("mystery"), None);
    }
}
