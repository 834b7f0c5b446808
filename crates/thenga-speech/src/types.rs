use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Requested output container. Providers reject values they cannot
    /// produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: None,
            model: None,
            speed: None,
            format: None,
        }
    }
}

/// Outcome of one synthesis call. A failed call is a response with
/// `success == false`, never a panic path, so the session can fall back to
/// client-side speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub success: bool,
    /// Base64-encoded audio. Absent for failures and for providers that
    /// synthesize on the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    pub format: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}
