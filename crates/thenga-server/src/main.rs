//! Thenga voice commerce server - websocket turn pipeline plus REST API.

use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod llm;
mod state;

use config::Settings;
use llm::OpenAiChatBackend;
use state::AppState;
use thenga_commerce::ShopifyCatalog;
use thenga_speech::{BrowserFallbackSynthesizer, CartesiaSynthesizer, SpeechSynthesizer};

#[derive(Debug, Parser)]
#[command(
    name = "thenga-server",
    about = "Voice commerce backend server",
    version = env!("CARGO_PKG_VERSION")
)]
struct ServerArgs {
    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BindConfig {
    host: String,
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thenga_server=info,thenga_agent=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Thenga voice commerce server");

    let settings = Settings::from_env()?;
    info!(
        environment = %settings.app_env,
        model = %settings.openai_model,
        store = %settings.shopify_store_url,
        "configuration loaded"
    );

    let backend = Arc::new(OpenAiChatBackend::new(settings.openai_api_key.clone())?);
    let catalog = Arc::new(ShopifyCatalog::new(
        &settings.shopify_store_url,
        &settings.shopify_access_token,
        &settings.shopify_api_version,
    )?);

    let mut speech_chain: Vec<Arc<dyn SpeechSynthesizer>> = Vec::new();
    let cartesia = CartesiaSynthesizer::new(settings.cartesia_config())?;
    if cartesia.is_available() {
        speech_chain.push(Arc::new(cartesia));
    } else {
        warn!("Cartesia API key missing, speech falls back to the client");
    }
    speech_chain.push(Arc::new(BrowserFallbackSynthesizer::new()));

    let state = AppState::new(settings, backend, catalog, speech_chain)?;
    let app = api::create_router(state.clone());

    let bind = resolve_bind_config(args);
    let addr = format!("{}:{}", bind.host, bind.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(state));

    info!("Server ready. Press Ctrl+C to stop.");
    server.await?;

    Ok(())
}

fn resolve_bind_config(args: ServerArgs) -> BindConfig {
    BindConfig {
        host: args.host.unwrap_or_else(host_from_env_or_default),
        port: args.port.unwrap_or_else(port_from_env_or_default),
    }
}

fn host_from_env_or_default() -> String {
    match std::env::var("THENGA_HOST") {
        Ok(raw) => {
            let host = raw.trim();
            if host.is_empty() {
                warn!("Empty THENGA_HOST, falling back to 0.0.0.0");
                "0.0.0.0".to_string()
            } else {
                host.to_string()
            }
        }
        Err(_) => "0.0.0.0".to_string(),
    }
}

fn port_from_env_or_default() -> u16 {
    match std::env::var("THENGA_PORT") {
        Ok(raw) => match raw.trim().parse::<u16>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid THENGA_PORT='{}', falling back to 8000", raw);
                8000
            }
        },
        Err(_) => 8000,
    }
}

/// Wait for shutdown signal and cleanup
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
    drop(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("environment lock poisoned")
    }

    fn clear_bind_env() {
        std::env::remove_var("THENGA_HOST");
        std::env::remove_var("THENGA_PORT");
    }

    fn parse(args: &[&str]) -> ServerArgs {
        ServerArgs::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn cli_values_override_environment() {
        let _guard = env_lock();
        clear_bind_env();
        std::env::set_var("THENGA_HOST", "0.0.0.0");
        std::env::set_var("THENGA_PORT", "8000");

        let bind = resolve_bind_config(parse(&[
            "thenga-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
        ]));

        assert_eq!(bind.host, "127.0.0.1");
        assert_eq!(bind.port, 9000);
        clear_bind_env();
    }

    #[test]
    fn uses_environment_when_cli_values_missing() {
        let _guard = env_lock();
        clear_bind_env();
        std::env::set_var("THENGA_HOST", "127.0.0.1");
        std::env::set_var("THENGA_PORT", "8088");

        let bind = resolve_bind_config(parse(&["thenga-server"]));

        assert_eq!(bind.host, "127.0.0.1");
        assert_eq!(bind.port, 8088);
        clear_bind_env();
    }

    #[test]
    fn falls_back_to_defaults_without_cli_or_environment() {
        let _guard = env_lock();
        clear_bind_env();

        let bind = resolve_bind_config(parse(&["thenga-server"]));

        assert_eq!(bind.host, "0.0.0.0");
        assert_eq!(bind.port, 8000);
    }

    #[test]
    fn falls_back_to_default_when_env_port_is_invalid() {
        let _guard = env_lock();
        clear_bind_env();
        std::env::set_var("THENGA_PORT", "not-a-port");

        let bind = resolve_bind_config(parse(&["thenga-server"]));

        assert_eq!(bind.port, 8000);
        clear_bind_env();
    }
}
