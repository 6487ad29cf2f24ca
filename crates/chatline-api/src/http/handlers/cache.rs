//! Cache administration handlers.
//!
//! Endpoints:
//! - GET    /api/v1/cache/status        - Backend health, counters, live connections
//! - GET    /api/v1/cache/conversations - Conversations with cached messages
//! - DELETE /api/v1/cache               - Remove every cached conversation entry

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use chatline_core::cache::CacheStats;
use chatline_types::cache::CacheStatus;
use chatline_types::ids::ConversationId;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CacheStatusResponse {
    #[serde(flatten)]
    pub status: CacheStatus,
    pub stats: CacheStats,
    pub live_connections: usize,
    pub live_conversations: usize,
}

/// GET /api/v1/cache/status
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CacheStatusResponse>>, AppError> {
    let clock = RequestClock::start();
    let service = state.conversations();
    let registry = state.dispatcher.registry();

    let body = CacheStatusResponse {
        status: service.cache_status().await,
        stats: service.cache_stats(),
        live_connections: registry.connection_count(),
        live_conversations: registry.conversation_count(),
    };

    Ok(Json(clock.respond(body).with_link("self", "/api/v1/cache/status")))
}

/// GET /api/v1/cache/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ConversationId>>>, AppError> {
    let clock = RequestClock::start();
    let conversations = state.conversations().active_conversations().await;
    Ok(Json(clock.respond(conversations)))
}

/// DELETE /api/v1/cache
pub async fn clear(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let clock = RequestClock::start();
    let removed = state.conversations().clear_cache().await;
    tracing::info!(removed, "cache cleared via API");
    Ok(Json(clock.respond(serde_json::json!({ "removed": removed }))))
}
