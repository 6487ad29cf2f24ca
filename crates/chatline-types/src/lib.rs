//! Shared domain types for Chatline.
//!
//! This crate contains the core domain types used across the Chatline
//! service: conversation and user identifiers, messages, conversation
//! metadata, cache envelopes, connection lifecycle, wire frames, and the
//! error and configuration types shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod ids;
pub mod message;
