//! HTTP and WebSocket request handlers.

pub mod cache;
pub mod conversation;
pub mod ws;
