//! HTTP layer for Chatline.
//!
//! Axum REST API at `/api/v1/` with envelope responses, the WebSocket
//! endpoint under `/ws/`, and CORS support.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
