//! Wire-level tests for the OpenAI-compatible gateway.

use futures::StreamExt;
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nauvoo::error::AgentError;
use nauvoo::gateway::{ChatRequest, InferenceGateway, OpenAiCompatGateway, ToolChoice};
use nauvoo::types::{FinishReason, Message, StreamChunk, ToolDescriptor};

fn sse_body(events: &[&str]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str("data: ");
        body.push_str(event);
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn request_with(tools: Vec<ToolDescriptor>) -> ChatRequest {
    ChatRequest {
        messages: vec![Message::user("hello")],
        tools,
        tool_choice: ToolChoice::Auto,
    }
}

async fn collect(
    gateway: &OpenAiCompatGateway,
    request: &ChatRequest,
) -> Vec<StreamChunk> {
    let stream = gateway.stream(request).await.expect("stream should open");
    stream
        .map(|chunk| chunk.expect("chunk should decode"))
        .collect()
        .await
}

#[tokio::test]
async fn streams_text_deltas_and_finish_reason() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":null}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let gateway = OpenAiCompatGateway::new("test-model", "test-key", server.uri());
    let chunks = collect(&gateway, &request_with(vec![])).await;

    let text: String = chunks.iter().filter_map(|c| c.text.clone()).collect();
    assert_eq!(text, "Hello");
    assert_eq!(chunks.last().unwrap().finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn tool_call_fragments_keep_a_stable_id_across_deltas() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"lookup","arguments":"{\"q\":"}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let gateway = OpenAiCompatGateway::new("test-model", "test-key", server.uri());
    let tool = ToolDescriptor::no_args("lookup", "look a thing up");
    let chunks = collect(&gateway, &request_with(vec![tool])).await;

    let fragments: Vec<_> = chunks.iter().flat_map(|c| c.tool_calls.clone()).collect();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].id, "call_abc");
    assert_eq!(fragments[0].name.as_deref(), Some("lookup"));
    assert_eq!(fragments[1].id, "call_abc");

    let arguments: String = fragments.into_iter().map(|f| f.arguments).collect();
    assert_eq!(arguments, r#"{"q":"rust"}"#);
    assert_eq!(
        chunks.last().unwrap().finish_reason,
        Some(FinishReason::ToolCalls)
    );
}

#[tokio::test]
async fn non_success_status_is_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let gateway = OpenAiCompatGateway::new("test-model", "test-key", server.uri());
    let err = match gateway.stream(&request_with(vec![])).await {
        Ok(_) => panic!("429 should not open a stream"),
        Err(err) => err,
    };

    match err {
        AgentError::Gateway(message) => {
            assert!(message.contains("429"));
            assert!(message.contains("slow down"));
        }
        other => panic!("expected gateway error, got {other:?}"),
    }
}

#[tokio::test]
async fn comment_lines_and_unparseable_chunks_are_skipped() {
    let server = MockServer::start().await;
    let body = format!(
        ": keep-alive\n\ndata: not json at all\n\n{}",
        sse_body(&[r#"{"choices":[{"delta":{"content":"ok"},"finish_reason":"stop"}]}"#])
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let gateway = OpenAiCompatGateway::new("test-model", "test-key", server.uri());
    let chunks = collect(&gateway, &request_with(vec![])).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text.as_deref(), Some("ok"));
}
