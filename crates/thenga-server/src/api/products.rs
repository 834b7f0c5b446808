//! Product search REST endpoint, backed by the same tool the agent uses.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/products/search", post(search_products))
}

#[derive(Debug, Deserialize)]
struct SearchProductsRequest {
    query: String,
    #[serde(default)]
    filters: Option<Map<String, Value>>,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    10
}

async fn search_products(
    State(state): State<AppState>,
    Json(request): Json<SearchProductsRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("Search query cannot be empty"));
    }

    let mut args = request.filters.unwrap_or_default();
    args.insert("query".to_string(), json!(request.query));
    args.insert("limit".to_string(), json!(request.limit));

    let result = state
        .tools
        .execute("search_products", Value::Object(args))
        .await;

    if !result.success {
        return Err(ApiError::bad_request(
            result.error.unwrap_or_else(|| "Search failed".to_string()),
        ));
    }

    let products = result.data.unwrap_or(Value::Array(Vec::new()));
    let count = products.as_array().map(Vec::len).unwrap_or(0);
    Ok(Json(json!({
        "products": products,
        "count": count,
    })))
}
