//! Streaming chat backend over the OpenAI chat completions API.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use thenga_agent::{
    AgentError, ChatBackend, ChatMessage, ChatRequest, Result, StreamDelta, ToolCallDelta,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiChatBackend {
    http: reqwest::Client,
    api_key: String,
}

impl OpenAiChatBackend {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, api_key })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        deltas: mpsc::Sender<StreamDelta>,
    ) -> Result<()> {
        let body = build_request_body(&request);
        let response = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::Model(format!("chat request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Model(format!(
                "chat completion returned {status}: {body}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::default();
        'outer: while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|err| AgentError::Model(format!("chat stream failed: {err}")))?;
            for payload in buffer.push(&chunk) {
                if payload == "[DONE]" {
                    break 'outer;
                }
                match parse_stream_payload(&payload) {
                    Some(delta) => {
                        if deltas.send(delta).await.is_err() {
                            debug!("delta receiver dropped, abandoning stream");
                            break 'outer;
                        }
                    }
                    None => warn!("skipping unparseable stream payload"),
                }
            }
        }
        Ok(())
    }
}

/// Chat completions request body, always in streaming mode. Tool
/// declarations are attached only when the turn offers tools.
fn build_request_body(request: &ChatRequest) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(wire_message).collect();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
        "stream": true,
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.clone());
    }
    body
}

fn wire_message(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::System(content) => json!({"role": "system", "content": content}),
        ChatMessage::User(content) => json!({"role": "user", "content": content}),
        ChatMessage::Assistant(content) => json!({"role": "assistant", "content": content}),
        ChatMessage::AssistantToolCalls(calls) => {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments,
                        }
                    })
                })
                .collect();
            json!({"role": "assistant", "content": Value::Null, "tool_calls": tool_calls})
        }
        ChatMessage::ToolResult {
            tool_call_id,
            content,
        } => json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}),
    }
}

/// Reassembles `data:` payloads from a server-sent-event byte stream that
/// may split lines across network chunks.
#[derive(Default)]
struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));
        let mut payloads = Vec::new();
        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            let line = line.trim();
            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
        }
        payloads
    }
}

/// Maps one `chat.completion.chunk` payload onto a stream delta. Returns
/// `None` when the payload is not valid JSON.
fn parse_stream_payload(payload: &str) -> Option<StreamDelta> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let delta = value.get("choices")?.get(0)?.get("delta")?;

    let content = delta
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let tool_calls = delta
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let index = call.get("index")?.as_u64()? as u32;
                    let function = call.get("function");
                    Some(ToolCallDelta {
                        index,
                        id: call
                            .get("id")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        name: function
                            .and_then(|f| f.get("name"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        arguments: function
                            .and_then(|f| f.get("arguments"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(StreamDelta {
        content,
        tool_calls,
    })
}
