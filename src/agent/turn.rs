//! Single request/response exchange with the gateway.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AgentError;
use crate::gateway::{ChatRequest, InferenceGateway, ToolChoice};
use crate::mcp::{is_exit_tool, ToolRouter, ASK_QUESTION, TASK_COMPLETE};
use crate::types::{Message, ToolCall};

use super::conversation::Conversation;

/// Callback used for caller-side rendering of turn activity.
pub type TurnEventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

/// Incremental events surfaced while a turn runs.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// A tool call started accumulating.
    ToolCallStarted { id: String, name: String },
    /// A tool-result message was appended.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

/// Per-turn options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnOptions {
    /// Abort the turn immediately, appending nothing, if the very first
    /// chunk carries no tool-call intent. Used when the loop expects a tool
    /// call and wants to fail fast if none is offered.
    pub exit_if_first_chunk_no_tool: bool,
}

/// What one turn appended to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A terminal plain assistant message.
    Assistant,
    /// An assistant tool-call message plus this many tool-result messages.
    ToolResults(usize),
    /// Early exit; nothing was appended.
    NoToolOffered,
}

/// Executes exactly one exchange: stream a generation, then resolve any
/// requested tool calls through the router.
///
/// The processor is the conversation's only writer while a turn runs; it
/// appends the assistant message and one tool-result message per requested
/// call, in request order.
pub struct TurnProcessor {
    gateway: Arc<dyn InferenceGateway>,
    router: Arc<dyn ToolRouter>,
    sink: Option<TurnEventSink>,
}

impl TurnProcessor {
    pub fn new(gateway: Arc<dyn InferenceGateway>, router: Arc<dyn ToolRouter>) -> Self {
        Self {
            gateway,
            router,
            sink: None,
        }
    }

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run one turn against the given conversation.
    ///
    /// Cancellation is cooperative: the token is polled at chunk boundaries
    /// and around the dispatch phase. Once observed, nothing further is
    /// appended; invocations already spawned keep running detached and
    /// their results are discarded.
    pub async fn process(
        &self,
        conversation: &mut Conversation,
        options: TurnOptions,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        let request = ChatRequest {
            messages: conversation.snapshot(),
            tools: self.router.catalog(),
            tool_choice: ToolChoice::Auto,
        };

        let mut stream = self.gateway.stream(&request).await?;

        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();
        let mut slot_by_id: HashMap<String, usize> = HashMap::new();
        let mut first_chunk = true;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Aborted),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;

            if first_chunk {
                first_chunk = false;
                if options.exit_if_first_chunk_no_tool && !chunk.has_tool_calls() {
                    // Fail fast; the stream is dropped without further
                    // consumption and nothing is appended.
                    return Ok(TurnOutcome::NoToolOffered);
                }
            }

            for fragment in chunk.tool_calls {
                match slot_by_id.get(&fragment.id) {
                    Some(&slot) => {
                        let call = &mut calls[slot];
                        call.arguments.push_str(&fragment.arguments);
                        if call.name.is_empty() {
                            if let Some(name) = fragment.name {
                                call.name = name;
                            }
                        }
                    }
                    None => {
                        let call = ToolCall {
                            id: fragment.id.clone(),
                            name: fragment.name.unwrap_or_default(),
                            arguments: fragment.arguments,
                        };
                        self.emit(TurnEvent::ToolCallStarted {
                            id: call.id.clone(),
                            name: call.name.clone(),
                        });
                        slot_by_id.insert(fragment.id, calls.len());
                        calls.push(call);
                    }
                }
            }

            if let Some(delta) = chunk.text {
                text.push_str(&delta);
                self.emit(TurnEvent::TextDelta { text: delta });
            }
        }

        if calls.is_empty() {
            conversation.push(Message::assistant(text));
            return Ok(TurnOutcome::Assistant);
        }

        if cancel.is_cancelled() {
            return Err(AgentError::Aborted);
        }

        debug!(calls = calls.len(), "resolving tool calls");
        conversation.push(Message::assistant_tool_calls(text, calls.clone()));
        let appended = self.resolve_calls(conversation, calls, cancel).await?;
        Ok(TurnOutcome::ToolResults(appended))
    }

    /// Resolve completed calls in request order.
    ///
    /// Provider-bound invocations are spawned concurrently across sessions;
    /// results are re-appended in the original call order so the
    /// conversation stays reproducible.
    async fn resolve_calls(
        &self,
        conversation: &mut Conversation,
        calls: Vec<ToolCall>,
        cancel: &CancellationToken,
    ) -> Result<usize, AgentError> {
        enum Resolution {
            Ready(String, bool),
            Dispatched(tokio::task::JoinHandle<Result<String, AgentError>>),
        }

        let mut resolutions = Vec::with_capacity(calls.len());
        for call in &calls {
            if is_exit_tool(&call.name) {
                let content = match call.name.as_str() {
                    TASK_COMPLETE => "Task marked as complete.",
                    ASK_QUESTION => "Control handed back to the user.",
                    _ => unreachable!("exit tools are a closed set"),
                };
                resolutions.push(Resolution::Ready(content.to_owned(), false));
                continue;
            }

            let arguments = match decode_arguments(&call.name, &call.arguments) {
                Ok(arguments) => arguments,
                Err(e) => {
                    resolutions.push(Resolution::Ready(e.to_string(), true));
                    continue;
                }
            };

            let router = Arc::clone(&self.router);
            let name = call.name.clone();
            resolutions.push(Resolution::Dispatched(tokio::spawn(async move {
                router.dispatch(&name, arguments).await
            })));
        }

        let mut appended = 0;
        for (call, resolution) in calls.into_iter().zip(resolutions) {
            let (content, is_error) = match resolution {
                Resolution::Ready(content, is_error) => (content, is_error),
                Resolution::Dispatched(handle) => {
                    let joined = tokio::select! {
                        // Detached invocations keep running; their results
                        // are discarded once the turn has aborted.
                        _ = cancel.cancelled() => return Err(AgentError::Aborted),
                        joined = handle => joined,
                    };
                    match joined {
                        Ok(Ok(content)) => (content, false),
                        Ok(Err(e)) => (e.to_string(), true),
                        Err(e) => (
                            AgentError::invocation(call.name.as_str(), format!("task failed: {e}"))
                                .to_string(),
                            true,
                        ),
                    }
                }
            };

            self.emit(TurnEvent::ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: content.clone(),
                is_error,
            });
            conversation.push(Message::tool_result(call.id, call.name, content));
            appended += 1;
        }

        Ok(appended)
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(sink) = &self.sink {
            (sink)(event);
        }
    }
}

/// Decode a raw argument payload into structured JSON.
///
/// An empty payload means "no arguments"; anything else must parse.
fn decode_arguments(tool_name: &str, raw: &str) -> Result<serde_json::Value, AgentError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|e| AgentError::MalformedArguments {
        tool_name: tool_name.to_owned(),
        message: format!("arguments are not valid JSON: {e}"),
    })
}
