//! Streaming turn orchestration.
//!
//! One call to [`StreamingTurnEngine::process`] runs exactly one
//! conversational turn: it streams the primary completion through the
//! sentence chunker, accumulates any tool-call deltas, executes at most one
//! round of tools, streams the follow-up completion the same way, flushes
//! the chunker, and always finishes with a single completion event — even
//! when the provider call fails outright.

use crate::chunker::SentenceChunker;
use crate::context::{ConversationContext, Message};
use crate::errors::{AgentError, Result};
use crate::model::{ChatBackend, ChatMessage, ChatRequest, StreamDelta, ToolCallDelta, ToolCallPayload};
use crate::tools::{ToolRegistry, ToolResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Spoken fallback when the provider call itself fails.
const FALLBACK_RESPONSE: &str = "I apologize, but I encountered an error. Please try again.";

pub const VOICE_SYSTEM_PROMPT: &str = "You are a helpful voice assistant for an e-commerce store.\n\
CRITICAL: Keep responses VERY SHORT - maximum 2-3 sentences for voice.\n\
When listing products, mention only name and price initially.\n\
End with \"Would you like more details?\" if applicable.\n\
Example: \"I found 2 hoodies. The Cloud Hoodie for $89 and Mountain Hoodie for $95. Would you like more details?\"";

#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    /// Rounds of tool invocation per turn: 0 disables tools, 1 allows the
    /// single round the turn state machine supports.
    pub tool_rounds: u8,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo-preview".to_string(),
            system_prompt: VOICE_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            tool_rounds: 1,
        }
    }
}

/// Events yielded while a turn runs. Chunks arrive in speaking order; the
/// completion event is always last and always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    TextChunk {
        content: String,
        trigger_speech: bool,
    },
    Completion {
        full_response: String,
    },
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

pub struct StreamingTurnEngine {
    backend: Arc<dyn ChatBackend>,
    tools: Arc<ToolRegistry>,
    options: TurnOptions,
}

impl StreamingTurnEngine {
    pub fn new(backend: Arc<dyn ChatBackend>, tools: Arc<ToolRegistry>, options: TurnOptions) -> Self {
        Self {
            backend,
            tools,
            options,
        }
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    /// Runs one turn for `text` against `context`, emitting events through
    /// `events`. Never fails: provider errors degrade into an apologetic
    /// chunk followed by a completion carrying the same text.
    pub async fn process(
        &self,
        text: &str,
        context: &mut ConversationContext,
        events: mpsc::Sender<TurnEvent>,
    ) {
        context.push_message(Message::user(text));

        match self.run_turn(text, &events).await {
            Ok(full_response) => {
                context.push_message(Message::assistant(full_response.clone()));
                let _ = events
                    .send(TurnEvent::Completion { full_response })
                    .await;
            }
            Err(err) => {
                error!(session_id = %context.session_id, error = %err, "turn failed");
                let _ = events
                    .send(TurnEvent::TextChunk {
                        content: FALLBACK_RESPONSE.to_string(),
                        trigger_speech: true,
                    })
                    .await;
                let _ = events
                    .send(TurnEvent::Completion {
                        full_response: FALLBACK_RESPONSE.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn run_turn(&self, text: &str, events: &mpsc::Sender<TurnEvent>) -> Result<String> {
        let mut chunker = SentenceChunker::new();
        let mut full_response = String::new();

        let mut messages = vec![
            ChatMessage::System(self.options.system_prompt.clone()),
            ChatMessage::User(text.to_string()),
        ];

        let tool_declarations = if self.options.tool_rounds > 0 {
            self.tools.definitions()
        } else {
            Vec::new()
        };

        // Primary pass: content deltas feed the chunker, tool-call deltas
        // accumulate keyed by the provider-assigned index.
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        self.stream_pass(
            ChatRequest {
                model: self.options.model.clone(),
                messages: messages.clone(),
                tools: tool_declarations,
                temperature: self.options.temperature,
            },
            &mut chunker,
            &mut full_response,
            events,
            Some(&mut pending),
        )
        .await?;

        if !pending.is_empty() && self.options.tool_rounds > 0 {
            let calls = finalize_tool_calls(pending);
            info!(count = calls.len(), "executing tool calls");
            let results = self.execute_tool_calls(&calls).await;

            messages.push(ChatMessage::AssistantToolCalls(calls));
            for (tool_call_id, content) in results {
                messages.push(ChatMessage::ToolResult {
                    tool_call_id,
                    content,
                });
            }

            // Secondary pass narrates the tool results. No tools are offered
            // so the turn is guaranteed to terminate; stray tool-call deltas
            // are ignored.
            self.stream_pass(
                ChatRequest {
                    model: self.options.model.clone(),
                    messages,
                    tools: Vec::new(),
                    temperature: self.options.temperature,
                },
                &mut chunker,
                &mut full_response,
                events,
                None,
            )
            .await?;
        }

        if let Some(rest) = chunker.flush() {
            send_chunk(events, rest).await?;
        }

        Ok(full_response)
    }

    async fn stream_pass(
        &self,
        request: ChatRequest,
        chunker: &mut SentenceChunker,
        full_response: &mut String,
        events: &mpsc::Sender<TurnEvent>,
        mut pending: Option<&mut BTreeMap<u32, PendingToolCall>>,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<StreamDelta>(32);
        let backend = self.backend.clone();
        let task = tokio::spawn(async move { backend.stream_chat(request, tx).await });

        while let Some(delta) = rx.recv().await {
            if let Some(pending) = pending.as_deref_mut() {
                for call_delta in delta.tool_calls {
                    accumulate_tool_call(pending, call_delta);
                }
            }
            if let Some(content) = delta.content {
                full_response.push_str(&content);
                for sentence in chunker.push(&content) {
                    if !sentence.trim().is_empty() {
                        send_chunk(events, sentence).await?;
                    }
                }
            }
        }

        task.await
            .map_err(|err| AgentError::Model(format!("stream task failed: {err}")))?
    }

    /// Resolves and runs each finalized tool call. Failures stay local to
    /// their call: the failed result is attached to the call id and the
    /// remaining calls still execute.
    async fn execute_tool_calls(&self, calls: &[ToolCallPayload]) -> Vec<(String, String)> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = match parse_arguments(&call.arguments) {
                Ok(args) => self.tools.execute(&call.name, args).await,
                Err(err) => {
                    debug!(tool = %call.name, error = %err, "invalid tool arguments");
                    ToolResult::fail(format!("Invalid tool arguments: {err}"))
                }
            };
            let content = serde_json::to_string(&outcome)
                .unwrap_or_else(|_| r#"{"success":false,"error":"result serialization failed"}"#.to_string());
            results.push((call.id.clone(), content));
        }
        results
    }
}

async fn send_chunk(events: &mpsc::Sender<TurnEvent>, content: String) -> Result<()> {
    events
        .send(TurnEvent::TextChunk {
            content,
            trigger_speech: true,
        })
        .await
        .map_err(|_| AgentError::Model("turn event receiver dropped".to_string()))
}

fn accumulate_tool_call(pending: &mut BTreeMap<u32, PendingToolCall>, delta: ToolCallDelta) {
    let entry = pending.entry(delta.index).or_default();
    if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
        entry.id = id;
    }
    if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
        entry.name = name;
    }
    if let Some(arguments) = delta.arguments {
        entry.arguments.push_str(&arguments);
    }
}

/// Orders accumulated calls by stream index and guarantees non-empty ids,
/// synthesizing a fallback when the provider omitted one.
fn finalize_tool_calls(pending: BTreeMap<u32, PendingToolCall>) -> Vec<ToolCallPayload> {
    pending
        .into_iter()
        .map(|(index, call)| ToolCallPayload {
            id: if call.id.is_empty() {
                format!("call_{index}")
            } else {
                call.id
            },
            name: call.name,
            arguments: call.arguments,
        })
        .collect()
}

/// Tool arguments must be a structured object before execution; anything
/// else is a per-call failure, not a turn failure.
fn parse_arguments(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    let value: Value = serde_json::from_str(raw)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(AgentError::InvalidInput(
            "tool arguments must be a JSON object".to_string(),
        ))
    }
}
