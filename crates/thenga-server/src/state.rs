//! Shared application state.

use crate::config::Settings;
use std::collections::HashMap;
use std::sync::Arc;
use thenga_agent::{
    ChatBackend, ConversationContext, InterruptCoordinator, StreamingTurnEngine, ToolRegistry,
    TurnOptions,
};
use thenga_commerce::{register_catalog_tools, CatalogGateway};
use thenga_speech::{SpeechSynthesizer, SynthesisRequest, SynthesisResponse};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, info};

/// One live conversation. The mutex serializes turns for the session while
/// the dispatch loop keeps receiving messages.
pub type SessionHandle = Arc<Mutex<ConversationContext>>;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Arc<StreamingTurnEngine>,
    pub tools: Arc<ToolRegistry>,
    pub interrupts: Arc<InterruptCoordinator>,
    /// Synthesis backends in preference order; the first success wins.
    speech_chain: Arc<Vec<Arc<dyn SpeechSynthesizer>>>,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    pub request_semaphore: Arc<Semaphore>,
    pub request_timeout_secs: u64,
}

impl AppState {
    pub fn new(
        settings: Settings,
        backend: Arc<dyn ChatBackend>,
        catalog: Arc<dyn CatalogGateway>,
        speech_chain: Vec<Arc<dyn SpeechSynthesizer>>,
    ) -> anyhow::Result<Self> {
        let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(100);
        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(120);

        let mut tools = ToolRegistry::new();
        register_catalog_tools(&mut tools, catalog)?;
        let tools = Arc::new(tools);
        info!(tools = ?tools.tool_names(), "tool registry initialized");

        let options = TurnOptions {
            model: settings.openai_model.clone(),
            temperature: settings.openai_temperature,
            ..TurnOptions::default()
        };
        let engine = Arc::new(StreamingTurnEngine::new(backend, tools.clone(), options));

        Ok(Self {
            settings: Arc::new(settings),
            engine,
            tools,
            interrupts: Arc::new(InterruptCoordinator::new()),
            speech_chain: Arc::new(speech_chain),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            request_timeout_secs,
        })
    }

    pub async fn acquire_permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.request_semaphore
            .acquire()
            .await
            .expect("semaphore never closed")
    }

    /// Resolves a session, creating the context on first use so a client
    /// reconnecting with a known id resumes its conversation.
    pub async fn get_or_create_session(&self, session_id: &str) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(session_id) {
                return handle.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "created conversation context");
                Arc::new(Mutex::new(ConversationContext::new(session_id)))
            })
            .clone()
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            self.interrupts.cleanup(session_id);
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Walks the synthesis chain until a backend succeeds. A chain where
    /// everything fails yields the last failure response.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> SynthesisResponse {
        let mut last: Option<SynthesisResponse> = None;
        for synth in self.speech_chain.iter() {
            if !synth.is_available() {
                continue;
            }
            let response = synth.synthesize(request).await;
            if response.success {
                return response;
            }
            debug!(provider = synth.provider(), "synthesis backend failed, trying next");
            last = Some(response);
        }
        last.unwrap_or(SynthesisResponse {
            success: false,
            audio_base64: None,
            format: "none".to_string(),
            provider: "none".to_string(),
            error: Some("No speech backend available".to_string()),
            duration_ms: None,
        })
    }
}
