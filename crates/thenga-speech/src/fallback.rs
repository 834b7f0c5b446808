//! Client-side speech fallback.
//!
//! Emits no audio bytes: the response tells the client to speak the text
//! itself with the Web Speech API. Always available, so it terminates every
//! fallback chain.

use crate::types::{SynthesisRequest, SynthesisResponse};
use crate::SpeechSynthesizer;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Default)]
pub struct BrowserFallbackSynthesizer;

impl BrowserFallbackSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SpeechSynthesizer for BrowserFallbackSynthesizer {
    fn provider(&self) -> &str {
        "browser_speechsynthesis"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> SynthesisResponse {
        debug!(chars = request.text.len(), "delegating synthesis to client");
        SynthesisResponse {
            success: true,
            audio_base64: None,
            format: "text".to_string(),
            provider: self.provider().to_string(),
            error: None,
            duration_ms: Some(0),
        }
    }
}
