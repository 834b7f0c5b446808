pub mod cartesia;
pub mod errors;
pub mod fallback;
pub mod types;

use async_trait::async_trait;

pub use cartesia::{CartesiaConfig, CartesiaSynthesizer};
pub use errors::SpeechError;
pub use fallback::BrowserFallbackSynthesizer;
pub use types::{SynthesisRequest, SynthesisResponse};

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn provider(&self) -> &str;

    /// Whether this backend can produce audio at all (for example, whether
    /// its credentials are configured).
    fn is_available(&self) -> bool;

    /// Synthesizes speech for `request`. Failures are reported in the
    /// response so callers can chain fallbacks.
    async fn synthesize(&self, request: &SynthesisRequest) -> SynthesisResponse;
}
