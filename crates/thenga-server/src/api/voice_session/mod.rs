//! Voice session websocket endpoint.
//!
//! Frontend responsibilities:
//! - microphone capture and local playback
//! - honoring the interrupt flag by stopping playback
//!
//! Backend responsibilities:
//! - turn orchestration (LLM streaming, tool calls, sentence chunking)
//! - per-chunk speech synthesis
//! - interruption bookkeeping
//!
//! Every message is a JSON object with a `type` and a `data` payload. The
//! first message must be `session.start`; afterwards the dispatch loop keeps
//! receiving while turns run in spawned tasks, so barge-in messages are
//! handled mid-turn.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thenga_agent::TurnEvent;
use thenga_speech::SynthesisRequest;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::request_context::RequestContext;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/voice/session", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let correlation_id = ctx.correlation_id;
    ws.on_upgrade(move |socket| handle_socket(socket, state, correlation_id))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, PartialEq)]
enum ClientEvent {
    SessionStart {
        session_id: Option<String>,
    },
    TextInput {
        text: String,
    },
    AudioInput,
    InterruptSpeech,
    UserSpeaking {
        transcript: Option<String>,
        interrupted_tts: bool,
    },
    TtsStarted,
    TtsEnded,
    TtsGenerate {
        text: String,
        voice_id: Option<String>,
        model: Option<String>,
        speed: Option<f64>,
        format: Option<String>,
    },
    SessionEnd,
}

/// Maps an inbound envelope onto a typed event. Unknown types and missing
/// required fields are protocol errors, answered with an `error` message.
fn parse_client_event(envelope: Envelope) -> Result<ClientEvent, String> {
    fn field<T>(data: Value, kind: &str) -> Result<T, String>
    where
        T: for<'de> Deserialize<'de>,
    {
        serde_json::from_value(data).map_err(|err| format!("Invalid {kind} payload: {err}"))
    }

    match envelope.kind.as_str() {
        "session.start" => {
            #[derive(Deserialize)]
            struct Data {
                #[serde(default)]
                session_id: Option<String>,
            }
            let data: Data = field(envelope.data, "session.start")?;
            Ok(ClientEvent::SessionStart {
                session_id: data.session_id.filter(|id| !id.trim().is_empty()),
            })
        }
        "text.input" => {
            #[derive(Deserialize)]
            struct Data {
                text: String,
            }
            let data: Data = field(envelope.data, "text.input")?;
            Ok(ClientEvent::TextInput { text: data.text })
        }
        "audio.input" => Ok(ClientEvent::AudioInput),
        "interrupt.speech" => Ok(ClientEvent::InterruptSpeech),
        "user.speaking" => {
            #[derive(Deserialize)]
            struct Data {
                #[serde(default)]
                transcript: Option<String>,
                #[serde(default)]
                interrupted_tts: bool,
            }
            let data: Data = field(envelope.data, "user.speaking")?;
            Ok(ClientEvent::UserSpeaking {
                transcript: data.transcript,
                interrupted_tts: data.interrupted_tts,
            })
        }
        "tts.started" => Ok(ClientEvent::TtsStarted),
        "tts.ended" => Ok(ClientEvent::TtsEnded),
        "tts.generate" => {
            #[derive(Deserialize)]
            struct Data {
                text: String,
                #[serde(default)]
                voice_id: Option<String>,
                #[serde(default)]
                model: Option<String>,
                #[serde(default)]
                speed: Option<f64>,
                #[serde(default)]
                format: Option<String>,
            }
            let data: Data = field(envelope.data, "tts.generate")?;
            Ok(ClientEvent::TtsGenerate {
                text: data.text,
                voice_id: data.voice_id,
                model: data.model,
                speed: data.speed,
                format: data.format,
            })
        }
        "session.end" => Ok(ClientEvent::SessionEnd),
        other => Err(format!("Unknown message type: {other}")),
    }
}

enum Flow {
    Continue,
    End,
}

async fn handle_socket(socket: WebSocket, state: AppState, correlation_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut session_id: Option<String> = None;
    let mut active_turn: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                warn!(correlation_id, "voice websocket receive error: {err}");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                match dispatch(
                    &state,
                    &out_tx,
                    &mut session_id,
                    &mut active_turn,
                    text.as_str(),
                )
                .await
                {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::End) => break,
                    Err(err) => {
                        send_event(&out_tx, "error", json!({"message": err}));
                    }
                }
            }
            Message::Binary(_) => {
                send_event(
                    &out_tx,
                    "error",
                    json!({"message": "Binary messages are not supported"}),
                );
            }
            Message::Close(_) => break,
            Message::Ping(payload) => {
                let _ = out_tx.send(Message::Pong(payload));
            }
            Message::Pong(_) => {}
        }
    }

    // Interrupt state is discarded; the conversation context is retained so
    // the client can resume with the same session id.
    if let Some(id) = session_id.as_deref() {
        state.interrupts.cleanup(id);
        info!(correlation_id, session_id = id, "voice session closed");
    }
    if let Some(task) = active_turn.take() {
        task.abort();
    }
    drop(out_tx);
    let _ = writer.await;
}

async fn dispatch(
    state: &AppState,
    out_tx: &mpsc::UnboundedSender<Message>,
    session_id: &mut Option<String>,
    active_turn: &mut Option<tokio::task::JoinHandle<()>>,
    text: &str,
) -> Result<Flow, String> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|err| format!("Invalid websocket payload: {err}"))?;
    let event = parse_client_event(envelope)?;

    if session_id.is_none() && !matches!(event, ClientEvent::SessionStart { .. }) {
        return Err("Expected session.start message".to_string());
    }

    match event {
        ClientEvent::SessionStart {
            session_id: requested,
        } => {
            let id = requested.unwrap_or_else(|| format!("sess_{}", Uuid::new_v4().simple()));
            state.get_or_create_session(&id).await;
            state.interrupts.register(&id);
            info!(session_id = %id, "voice session ready");
            send_event(
                out_tx,
                "session.ready",
                json!({"session_id": id, "message": "Session ready"}),
            );
            *session_id = Some(id);
        }
        ClientEvent::TextInput { text } => {
            let id = session_id.clone().unwrap_or_default();
            info!(session_id = %id, chars = text.len(), "processing text input");
            *active_turn = Some(spawn_turn_task(state.clone(), id, text, out_tx.clone()));
        }
        ClientEvent::AudioInput => {
            send_event(
                out_tx,
                "error",
                json!({"message": "Audio input is not supported; send text.input"}),
            );
        }
        ClientEvent::InterruptSpeech => {
            let id = session_id.as_deref().unwrap_or_default();
            let success = state.interrupts.interrupt(id);
            send_event(
                out_tx,
                "speech.interrupted",
                json!({
                    "success": success,
                    "message": if success { "Speech interrupted" } else { "Session not registered" },
                }),
            );
        }
        ClientEvent::UserSpeaking {
            transcript,
            interrupted_tts,
        } => {
            let id = session_id.as_deref().unwrap_or_default();
            let success = state.interrupts.interrupt(id);
            if let Some(transcript) = transcript.as_deref() {
                info!(session_id = %id, transcript, "user speaking");
            }
            send_event(
                out_tx,
                "speech.interrupted",
                json!({
                    "success": success,
                    "message": if success { "Speech interrupted" } else { "Session not registered" },
                    "interrupted_tts": interrupted_tts,
                }),
            );
        }
        ClientEvent::TtsStarted => {
            let id = session_id.as_deref().unwrap_or_default();
            state.interrupts.clear(id);
            send_event(
                out_tx,
                "tts.acknowledged",
                json!({"message": "TTS playback started"}),
            );
        }
        ClientEvent::TtsEnded => {
            send_event(
                out_tx,
                "tts.acknowledged",
                json!({"message": "TTS playback ended"}),
            );
        }
        ClientEvent::TtsGenerate {
            text,
            voice_id,
            model,
            speed,
            format,
        } => {
            let request = SynthesisRequest {
                text: text.clone(),
                voice_id,
                model,
                speed,
                format,
            };
            let response = state.synthesize(&request).await;
            send_event(
                out_tx,
                "tts.generated",
                json!({
                    "success": response.success,
                    "audio_base64": response.audio_base64,
                    "format": response.format,
                    "provider": response.provider,
                    "duration_ms": response.duration_ms,
                    "error": response.error,
                    "text": text,
                }),
            );
        }
        ClientEvent::SessionEnd => return Ok(Flow::End),
    }

    Ok(Flow::Continue)
}

/// Runs one turn without blocking the dispatch loop. The per-session mutex
/// serializes turns for the same session; the semaphore bounds process-wide
/// concurrency.
fn spawn_turn_task(
    state: AppState,
    session_id: String,
    text: String,
    out_tx: mpsc::UnboundedSender<Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let _permit = state.acquire_permit().await;
        let handle = state.get_or_create_session(&session_id).await;
        let mut context = handle.lock().await;

        let timeout = Duration::from_secs(state.request_timeout_secs);
        let turn = run_turn(&state, &session_id, &text, &mut context, &out_tx);
        if tokio::time::timeout(timeout, turn).await.is_err() {
            warn!(session_id, "turn timed out");
            send_event(&out_tx, "error", json!({"message": "Turn timed out"}));
        }
    })
}

/// Consumes engine events for one turn, emitting `text.chunk`, per-chunk
/// `audio.chunk`, and the final `agent.response`. An interrupt suppresses
/// synthesis for subsequent chunks while text keeps flowing; a failed
/// synthesis reports an error for that chunk and the turn continues.
pub(crate) async fn run_turn(
    state: &AppState,
    session_id: &str,
    text: &str,
    context: &mut thenga_agent::ConversationContext,
    out_tx: &mpsc::UnboundedSender<Message>,
) {
    let (events_tx, mut events_rx) = mpsc::channel::<TurnEvent>(32);

    let consumer = async {
        let mut chunk_id = 0u32;
        while let Some(event) = events_rx.recv().await {
            match event {
                TurnEvent::TextChunk {
                    content,
                    trigger_speech,
                } => {
                    chunk_id += 1;
                    send_event(
                        out_tx,
                        "text.chunk",
                        json!({"text": content.clone(), "chunk_id": chunk_id}),
                    );

                    if !trigger_speech || state.interrupts.is_interrupted(session_id) {
                        continue;
                    }
                    let response = state.synthesize(&SynthesisRequest::new(&*content)).await;
                    if response.success {
                        send_event(
                            out_tx,
                            "audio.chunk",
                            json!({
                                "audio_base64": response.audio_base64,
                                "format": response.format,
                                "chunk_id": chunk_id,
                                "text": content,
                            }),
                        );
                    } else {
                        send_event(
                            out_tx,
                            "error",
                            json!({
                                "message": format!(
                                    "Speech synthesis failed for chunk {chunk_id}: {}",
                                    response.error.unwrap_or_else(|| "unknown".to_string())
                                ),
                            }),
                        );
                    }
                }
                TurnEvent::Completion { full_response } => {
                    send_event(
                        out_tx,
                        "agent.response",
                        json!({"text": full_response, "chunks_sent": chunk_id}),
                    );
                }
            }
        }
    };

    let engine = state.engine.clone();
    tokio::join!(engine.process(text, context, events_tx), consumer);
}

fn send_event(out_tx: &mpsc::UnboundedSender<Message>, kind: &str, data: Value) -> bool {
    let value = json!({"type": kind, "data": data});
    match serde_json::to_string(&value) {
        Ok(text) => out_tx.send(Message::Text(text.into())).is_ok(),
        Err(err) => {
            warn!("failed to serialize voice ws event: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use thenga_agent::{AgentError, ChatBackend, ChatRequest, StreamDelta, ToolCallDelta};
    use thenga_commerce::{CatalogGateway, CommerceError, Product, ProductVariant};
    use thenga_speech::{SpeechSynthesizer, SynthesisResponse};

    fn parse(kind: &str, data: Value) -> Result<ClientEvent, String> {
        parse_client_event(Envelope {
            kind: kind.to_string(),
            data,
        })
    }

    #[test]
    fn parses_session_start_with_and_without_id() {
        assert_eq!(
            parse("session.start", json!({"session_id": "abc"})).expect("parse"),
            ClientEvent::SessionStart {
                session_id: Some("abc".to_string())
            }
        );
        assert_eq!(
            parse("session.start", json!({})).expect("parse"),
            ClientEvent::SessionStart { session_id: None }
        );
        // Blank ids are treated as absent.
        assert_eq!(
            parse("session.start", json!({"session_id": "  "})).expect("parse"),
            ClientEvent::SessionStart { session_id: None }
        );
    }

    #[test]
    fn text_input_requires_text_field() {
        assert_eq!(
            parse("text.input", json!({"text": "hi"})).expect("parse"),
            ClientEvent::TextInput {
                text: "hi".to_string()
            }
        );
        assert!(parse("text.input", json!({})).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse("video.input", json!({})).expect_err("must fail");
        assert!(err.contains("Unknown message type"));
    }

    #[test]
    fn user_speaking_defaults_apply() {
        assert_eq!(
            parse("user.speaking", json!({})).expect("parse"),
            ClientEvent::UserSpeaking {
                transcript: None,
                interrupted_tts: false
            }
        );
    }

    #[test]
    fn tts_generate_carries_optional_fields() {
        assert_eq!(
            parse(
                "tts.generate",
                json!({"text": "Hello.", "voice_id": "v1", "format": "wav"})
            )
            .expect("parse"),
            ClientEvent::TtsGenerate {
                text: "Hello.".to_string(),
                voice_id: Some("v1".to_string()),
                model: None,
                speed: None,
                format: Some("wav".to_string()),
            }
        );
        assert_eq!(
            parse("tts.generate", json!({"text": "Hello."})).expect("parse"),
            ClientEvent::TtsGenerate {
                text: "Hello.".to_string(),
                voice_id: None,
                model: None,
                speed: None,
                format: None,
            }
        );
    }

    #[test]
    fn envelope_without_data_parses_for_unit_events() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"type":"session.end"}"#).expect("envelope");
        assert_eq!(
            parse_client_event(envelope).expect("parse"),
            ClientEvent::SessionEnd
        );
    }

    struct ScriptedBackend {
        scripts: Mutex<Vec<Vec<StreamDelta>>>,
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn stream_chat(
            &self,
            _request: ChatRequest,
            deltas: mpsc::Sender<StreamDelta>,
        ) -> thenga_agent::Result<()> {
            let script = {
                let mut scripts = self.scripts.lock().expect("lock");
                if scripts.is_empty() {
                    return Err(AgentError::Model("no script".to_string()));
                }
                scripts.remove(0)
            };
            for delta in script {
                if deltas.send(delta).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    struct StubCatalog;

    #[async_trait]
    impl CatalogGateway for StubCatalog {
        async fn list_products(&self, _limit: u32) -> Result<Vec<Product>, CommerceError> {
            Ok(vec![cloud_hoodie()])
        }

        async fn get_product(
            &self,
            product_id: &str,
        ) -> Result<Option<Product>, CommerceError> {
            Ok((product_id == "1").then(cloud_hoodie))
        }

        async fn search_products(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<Product>, CommerceError> {
            Ok(vec![cloud_hoodie()])
        }
    }

    fn cloud_hoodie() -> Product {
        Product {
            id: "1".to_string(),
            title: "Cloud Hoodie".to_string(),
            description: None,
            vendor: None,
            product_type: None,
            tags: Vec::new(),
            price: 50.0,
            currency: "USD".to_string(),
            images: Vec::new(),
            variants: vec![ProductVariant {
                id: "1-v1".to_string(),
                product_id: "1".to_string(),
                title: "Default".to_string(),
                sku: None,
                price: 50.0,
                compare_at_price: None,
                available: true,
                inventory_quantity: Some(3),
                options: Default::default(),
            }],
            available: true,
        }
    }

    struct StubSynth;

    #[async_trait]
    impl SpeechSynthesizer for StubSynth {
        fn provider(&self) -> &str {
            "stub"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn synthesize(&self, _request: &SynthesisRequest) -> SynthesisResponse {
            SynthesisResponse {
                success: true,
                audio_base64: Some("QUJD".to_string()),
                format: "wav".to_string(),
                provider: "stub".to_string(),
                error: None,
                duration_ms: Some(5),
            }
        }
    }

    fn content(text: &str) -> StreamDelta {
        StreamDelta {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
        }
    }

    fn state_with_scripts(scripts: Vec<Vec<StreamDelta>>) -> AppState {
        AppState::new(
            Settings::default(),
            Arc::new(ScriptedBackend {
                scripts: Mutex::new(scripts),
            }),
            Arc::new(StubCatalog),
            vec![Arc::new(StubSynth)],
        )
        .expect("state")
    }

    async fn collect_turn(state: &AppState, session_id: &str, text: &str) -> Vec<Value> {
        let handle = state.get_or_create_session(session_id).await;
        let mut context = handle.lock().await;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        run_turn(state, session_id, text, &mut context, &out_tx).await;
        drop(out_tx);

        let mut events = Vec::new();
        while let Ok(message) = out_rx.try_recv() {
            if let Message::Text(text) = message {
                events.push(serde_json::from_str(text.as_str()).expect("json"));
            }
        }
        events
    }

    #[tokio::test]
    async fn plain_turn_emits_chunk_audio_and_response() {
        let full = "I found two hoodies: Cloud Hoodie ($50) and Rebel Hoodie ($85).";
        let state = state_with_scripts(vec![vec![
            content("I found two hoodies: Cloud Hoodie "),
            content("($50) and Rebel Hoodie ($85)."),
        ]]);
        state.interrupts.register("sess_e2e");

        let events = collect_turn(&state, "sess_e2e", "Show me hoodies").await;

        let kinds: Vec<&str> = events
            .iter()
            .map(|event| event["type"].as_str().expect("type"))
            .collect();
        assert_eq!(kinds, vec!["text.chunk", "audio.chunk", "agent.response"]);
        assert_eq!(events[0]["data"]["text"], full);
        assert_eq!(events[0]["data"]["chunk_id"], 1);
        assert_eq!(events[1]["data"]["audio_base64"], "QUJD");
        assert_eq!(events[1]["data"]["chunk_id"], 1);
        assert_eq!(events[2]["data"]["text"], full);
        assert_eq!(events[2]["data"]["chunks_sent"], 1);

        // User message plus assistant reply.
        let handle = state.get_session("sess_e2e").await.expect("session");
        let context = handle.lock().await;
        assert_eq!(context.messages.len(), 2);
    }

    #[tokio::test]
    async fn tool_round_trip_never_leaks_the_tool_call() {
        let state = state_with_scripts(vec![
            vec![StreamDelta {
                content: None,
                tool_calls: vec![ToolCallDelta {
                    index: 0,
                    id: Some("call_1".to_string()),
                    name: Some("search_products".to_string()),
                    arguments: Some("{\"query\":\"hoodie\"}".to_string()),
                }],
            }],
            vec![content("I found the Cloud Hoodie for $50. ")],
        ]);
        state.interrupts.register("sess_tools");

        let events = collect_turn(&state, "sess_tools", "find hoodies").await;

        let kinds: Vec<&str> = events
            .iter()
            .map(|event| event["type"].as_str().expect("type"))
            .collect();
        assert_eq!(kinds, vec!["text.chunk", "audio.chunk", "agent.response"]);
        for event in &events {
            let raw = event.to_string();
            assert!(!raw.contains("search_products"));
            assert!(!raw.contains("call_1"));
        }
        assert_eq!(events[0]["data"]["text"], "I found the Cloud Hoodie for $50. ");
    }

    #[tokio::test]
    async fn interrupted_session_suppresses_audio_only() {
        let state = state_with_scripts(vec![vec![
            content("First sentence here. Second sentence here. "),
        ]]);
        state.interrupts.register("sess_int");
        state.interrupts.interrupt("sess_int");

        let events = collect_turn(&state, "sess_int", "talk to me").await;

        let kinds: Vec<&str> = events
            .iter()
            .map(|event| event["type"].as_str().expect("type"))
            .collect();
        assert_eq!(kinds, vec!["text.chunk", "text.chunk", "agent.response"]);
    }

    #[tokio::test]
    async fn provider_failure_still_completes_the_turn() {
        let state = state_with_scripts(Vec::new());
        state.interrupts.register("sess_fail");

        let events = collect_turn(&state, "sess_fail", "hello").await;

        let kinds: Vec<&str> = events
            .iter()
            .map(|event| event["type"].as_str().expect("type"))
            .collect();
        assert_eq!(kinds, vec!["text.chunk", "audio.chunk", "agent.response"]);
        assert_eq!(
            events[2]["data"]["text"],
            "I apologize, but I encountered an error. Please try again."
        );
    }
}
