use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;
use tracing::info;

use crate::metrics::CACHE_SIZE;
use crate::state::AppState;

// Cache counters for observability
pub async fn cache_stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cache.stats())
}

// Manual invalidation of all cached responses
pub async fn cache_clear_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.cache.clear();
    CACHE_SIZE.set(0.0);
    info!("response cache cleared by admin request");
    Json(serde_json::json!({"message": "Cache cleared successfully"}))
}
