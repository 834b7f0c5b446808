use thiserror::Error;

/// Transport-level synthesis failures. Synthesizers fold these into a
/// failed [`crate::SynthesisResponse`] so fallback chains keep working.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("synthesis request failed: {0}")]
    Request(String),

    #[error("synthesis provider responded with status {status}: {body}")]
    Api { status: u16, body: String },
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        SpeechError::Request(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;
