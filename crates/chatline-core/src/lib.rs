//! Conversation cache and real-time delivery for Chatline.
//!
//! This crate defines the "ports" (store, cache backend and completion
//! provider traits) that the infrastructure layer implements, and the
//! services built on them: the TTL cache layer, the conversation cache
//! service with durable fallback, the connection registry and the
//! real-time dispatcher. It depends only on `chatline-types` -- never on
//! `chatline-infra` or any database/IO crate.

pub mod cache;
pub mod completion;
pub mod conversation;
pub mod realtime;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
