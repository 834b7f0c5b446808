//! Cartesia text-to-speech over the `tts/bytes` REST endpoint.

use crate::errors::{Result, SpeechError};
use crate::types::{SynthesisRequest, SynthesisResponse};
use crate::SpeechSynthesizer;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TTS_BYTES_URL: &str = "https://api.cartesia.ai/tts/bytes";
const API_VERSION: &str = "2024-06-30";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CartesiaConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub voice_id: String,
    pub language: String,
    pub speed: f64,
}

impl Default for CartesiaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "sonic-3".to_string(),
            voice_id: "f786b574-daa5-4673-aa0c-cbe3e8534c02".to_string(),
            language: "en".to_string(),
            speed: 1.0,
        }
    }
}

pub struct CartesiaSynthesizer {
    config: CartesiaConfig,
    http: reqwest::Client,
}

impl CartesiaSynthesizer {
    pub fn new(config: CartesiaConfig) -> Result<Self> {
        if config.api_key.is_none() {
            warn!("cartesia synthesizer constructed without an api key");
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, http })
    }

    async fn request_audio(&self, api_key: &str, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let payload = synthesis_payload(&self.config, request);
        let response = self
            .http
            .post(TTS_BYTES_URL)
            .header("Cartesia-Version", API_VERSION)
            .header("X-API-Key", api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn failure(&self, error: String) -> SynthesisResponse {
        SynthesisResponse {
            success: false,
            audio_base64: None,
            format: "wav".to_string(),
            provider: self.provider().to_string(),
            error: Some(error),
            duration_ms: None,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for CartesiaSynthesizer {
    fn provider(&self) -> &str {
        "cartesia"
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> SynthesisResponse {
        // Only wav containers are produced; anything else must not silently
        // come back as wav bytes.
        if let Some(format) = request.format.as_deref() {
            if format != "wav" {
                return self.failure(format!("Unsupported output format: {format}"));
            }
        }
        let Some(api_key) = self.config.api_key.as_deref() else {
            return self.failure("Cartesia TTS not available - missing API key".to_string());
        };

        let started = Instant::now();
        match self.request_audio(api_key, request).await {
            Ok(audio) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(bytes = audio.len(), duration_ms, "cartesia synthesis finished");
                SynthesisResponse {
                    success: true,
                    audio_base64: Some(BASE64.encode(audio)),
                    format: "wav".to_string(),
                    provider: self.provider().to_string(),
                    error: None,
                    duration_ms: Some(duration_ms),
                }
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                warn!(error = %err, duration_ms, "cartesia synthesis failed");
                SynthesisResponse {
                    success: false,
                    audio_base64: None,
                    format: "wav".to_string(),
                    provider: self.provider().to_string(),
                    error: Some(format!("TTS generation failed: {err}")),
                    duration_ms: Some(duration_ms),
                }
            }
        }
    }
}

/// Request body for `tts/bytes`. Per-request voice, model and speed override
/// the configured defaults.
fn synthesis_payload(config: &CartesiaConfig, request: &SynthesisRequest) -> Value {
    json!({
        "model_id": request.model.as_deref().unwrap_or(&config.model),
        "transcript": request.text,
        "voice": {
            "mode": "id",
            "id": request.voice_id.as_deref().unwrap_or(&config.voice_id),
        },
        "output_format": {
            "container": "wav",
            "encoding": "pcm_s16le",
            "sample_rate": 22050,
        },
        "language": config.language,
        "speed": request.speed.unwrap_or(config.speed),
    })
}
