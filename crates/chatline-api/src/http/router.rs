//! Axum router configuration with middleware.
//!
//! REST routes are under `/api/v1/`, the WebSocket endpoint under `/ws/`.
//! Middleware: CORS, tracing.

use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chatline_types::cache::CacheHealth;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Conversations
        .route(
            "/conversations/{id}",
            delete(handlers::conversation::delete_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(handlers::conversation::get_messages),
        )
        .route(
            "/conversations/{id}/metadata",
            get(handlers::conversation::get_metadata),
        )
        .route(
            "/conversations/{id}/invalidate",
            post(handlers::conversation::invalidate),
        )
        // Cache administration
        .route("/cache", delete(handlers::cache::clear))
        .route("/cache/status", get(handlers::cache::get_status))
        .route(
            "/cache/conversations",
            get(handlers::cache::list_conversations),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route(
            "/ws/{user_id}/conversations/{conversation_id}",
            get(handlers::ws::ws_handler),
        )
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus cache and store reachability.
///
/// A Down cache degrades latency, not correctness, so it reports
/// `degraded` rather than failing the check.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let service = state.conversations();
    let cache = service.cache_health().await;
    let store = service.store_reachable().await;
    let status = match (store, cache) {
        (false, _) => "unavailable",
        (true, CacheHealth::Down) => "degraded",
        (true, CacheHealth::Up) => "ok",
    };

    axum::Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "cache": cache,
        "store": if store { "up" } else { "down" },
        "connections": state.dispatcher.registry().connection_count(),
    }))
}
