//! Conversation cache service.
//!
//! `ConversationCacheService` owns the consistency policy between the TTL
//! cache and the durable store: reads try the cache and fall back to the
//! store, appends go to the store first and then patch the cache.

mod generation;
pub mod service;

pub use service::ConversationCacheService;
