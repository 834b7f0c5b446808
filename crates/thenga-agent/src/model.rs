//! Seam to the streaming, tool-augmented completion backend.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// One message in the model conversation, including the tool-call exchange
/// shapes the function-calling wire protocol requires.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant(String),
    AssistantToolCalls(Vec<ToolCallPayload>),
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

/// A finalized tool call as the assistant reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Function declarations offered to the model; empty disables tools.
    pub tools: Vec<Value>,
    pub temperature: f32,
}

/// One streamed fragment from the backend: text content and/or tool-call
/// deltas keyed by the provider-assigned index.
#[derive(Debug, Clone, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Streams one completion, sending deltas through `deltas` as they
    /// arrive. Returns after the stream ends; an error means the provider
    /// call itself failed.
    async fn stream_chat(
        &self,
        request: ChatRequest,
        deltas: mpsc::Sender<StreamDelta>,
    ) -> Result<()>;
}
