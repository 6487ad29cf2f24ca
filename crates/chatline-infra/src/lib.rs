//! Infrastructure layer for Chatline.
//!
//! Contains implementations of the ports defined in `chatline-core`: the
//! SQLite conversation store, the Redis cache backend, the HTTP completion
//! provider, and the configuration loader.

pub mod cache;
pub mod completion;
pub mod config;
pub mod sqlite;
