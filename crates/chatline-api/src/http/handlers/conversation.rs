//! Conversation HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/conversations/{id}/messages?limit= - Most recent messages, oldest first
//! - GET    /api/v1/conversations/{id}/metadata        - Conversation summary
//! - DELETE /api/v1/conversations/{id}                 - Delete from store and cache
//! - POST   /api/v1/conversations/{id}/invalidate      - Drop cached entries only

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use chatline_types::ids::ConversationId;
use chatline_types::message::{ConversationMetadata, Message};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// Largest page a single request may ask for.
pub const MAX_MESSAGE_LIMIT: usize = 500;

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/v1/conversations/{id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<Message>>>, AppError> {
    let clock = RequestClock::start();
    let id = ConversationId::parse(id)?;
    if query.limit > MAX_MESSAGE_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be at most {MAX_MESSAGE_LIMIT}"
        )));
    }

    let messages = state
        .conversations()
        .read_recent_messages(&id, query.limit)
        .await?;

    let resp = clock
        .respond(messages)
        .with_link("self", &format!("/api/v1/conversations/{id}/messages"))
        .with_link("metadata", &format!("/api/v1/conversations/{id}/metadata"));
    Ok(Json(resp))
}

/// GET /api/v1/conversations/{id}/metadata
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ConversationMetadata>>, AppError> {
    let clock = RequestClock::start();
    let id = ConversationId::parse(id)?;

    let metadata = state.conversations().get_metadata(&id).await?;

    let resp = clock
        .respond(metadata)
        .with_link("self", &format!("/api/v1/conversations/{id}/metadata"))
        .with_link("messages", &format!("/api/v1/conversations/{id}/messages"));
    Ok(Json(resp))
}

/// DELETE /api/v1/conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let clock = RequestClock::start();
    let id = ConversationId::parse(id)?;

    state.conversations().delete_conversation(&id).await?;

    Ok(Json(clock.respond(serde_json::json!({ "deleted": true }))))
}

/// POST /api/v1/conversations/{id}/invalidate
pub async fn invalidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let clock = RequestClock::start();
    let id = ConversationId::parse(id)?;

    let removed = state.conversations().invalidate(&id).await;

    Ok(Json(clock.respond(serde_json::json!({ "invalidated": removed }))))
}
