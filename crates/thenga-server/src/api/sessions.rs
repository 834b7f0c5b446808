//! Session lifecycle REST endpoints.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{session_id}", get(get_session))
        .route("/api/sessions/{session_id}", delete(end_session))
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    metadata: Option<Value>,
}

async fn create_session(
    State(state): State<AppState>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Json<Value> {
    let session_id = format!("sess_{}", Uuid::new_v4().simple());
    let handle = state.get_or_create_session(&session_id).await;

    if let Some(Json(request)) = payload {
        if let Some(Value::Object(metadata)) = request.metadata {
            let mut context = handle.lock().await;
            for (key, value) in metadata {
                context.user_preferences.insert(key, value);
            }
        }
    }

    info!(session_id, "created session");
    Json(json!({
        "session_id": session_id,
        "expires_in": state.settings.session_ttl_secs,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let handle = state
        .get_session(&session_id)
        .await
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    let context = handle.lock().await;
    Ok(Json(json!({
        "session_id": session_id,
        "messages": context.messages,
        "context": {
            "cart_items": context.cart_items,
            "viewed_products": context.viewed_products,
            "user_preferences": context.user_preferences,
        }
    })))
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.remove_session(&session_id).await {
        return Err(ApiError::not_found("Session not found"));
    }
    info!(session_id, "ended session");
    Ok(Json(json!({"message": "Session ended successfully"})))
}
