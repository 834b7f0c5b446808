//! Liveness and public configuration endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.settings.app_env,
        "active_sessions": state.session_count().await,
    }))
}

async fn config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "features": {
            "voice": state.settings.enable_voice,
            "chat": true,
        },
        "voice": {
            "enabled": state.settings.enable_voice,
            "language": state.settings.cartesia_language,
        },
        "tools": state.tools.tool_names(),
    }))
}
