//! Environment-backed runtime settings.

use thenga_speech::CartesiaConfig;

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_env: String,
    pub shopify_store_url: String,
    pub shopify_access_token: String,
    pub shopify_api_version: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub cartesia_api_key: Option<String>,
    pub cartesia_model: String,
    pub cartesia_voice_id: String,
    pub cartesia_language: String,
    pub cartesia_speed: f64,
    pub session_ttl_secs: u64,
    pub enable_voice: bool,
}

impl Settings {
    /// Reads settings from the process environment. The three credentials
    /// without a sane default are required; everything else falls back.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            app_env: env_or("APP_ENV", "development"),
            shopify_store_url: required("SHOPIFY_STORE_URL")?,
            shopify_access_token: required("SHOPIFY_ACCESS_TOKEN")?,
            shopify_api_version: env_or("SHOPIFY_API_VERSION", "2024-01"),
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_model: env_or("OPENAI_MODEL", "gpt-4-turbo-preview"),
            openai_temperature: parsed_env_or("OPENAI_TEMPERATURE", 0.7),
            cartesia_api_key: std::env::var("CARTESIA_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            cartesia_model: env_or("CARTESIA_MODEL", "sonic-3"),
            cartesia_voice_id: env_or(
                "CARTESIA_VOICE_ID",
                "f786b574-daa5-4673-aa0c-cbe3e8534c02",
            ),
            cartesia_language: env_or("CARTESIA_LANGUAGE", "en"),
            cartesia_speed: parsed_env_or("CARTESIA_SPEED", 1.0),
            session_ttl_secs: parsed_env_or("SESSION_TTL", 3600),
            enable_voice: parsed_env_or("ENABLE_VOICE", true),
        })
    }

    pub fn cartesia_config(&self) -> CartesiaConfig {
        CartesiaConfig {
            api_key: self.cartesia_api_key.clone(),
            model: self.cartesia_model.clone(),
            voice_id: self.cartesia_voice_id.clone(),
            language: self.cartesia_language.clone(),
            speed: self.cartesia_speed,
        }
    }
}

#[cfg(test)]
impl Default for Settings {
    fn default() -> Self {
        Self {
            app_env: "test".to_string(),
            shopify_store_url: "test-store.myshopify.com".to_string(),
            shopify_access_token: "shpat_test".to_string(),
            shopify_api_version: "2024-01".to_string(),
            openai_api_key: "sk-test".to_string(),
            openai_model: "gpt-4-turbo-preview".to_string(),
            openai_temperature: 0.7,
            cartesia_api_key: None,
            cartesia_model: "sonic-3".to_string(),
            cartesia_voice_id: "f786b574-daa5-4673-aa0c-cbe3e8534c02".to_string(),
            cartesia_language: "en".to_string(),
            cartesia_speed: 1.0,
            session_ttl_secs: 3600,
            enable_voice: true,
        }
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required environment variable {name}"))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_env_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
