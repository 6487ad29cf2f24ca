//! Per-conversation generation numbers.
//!
//! A cache fill records the generation it started under; anything that
//! changes what the cache should hold for a conversation (an append, an
//! invalidation) moves the generation forward. A fill that finishes under
//! an older generation is discarded.

use std::sync::atomic::{AtomicU64, Ordering};

use chatline_types::ids::ConversationId;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct Generations {
    current: DashMap<ConversationId, u64>,
    counter: AtomicU64,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of `conversation_id`; 0 if it has never been bumped.
    pub fn current(&self, conversation_id: &ConversationId) -> u64 {
        self.current
            .get(conversation_id)
            .map(|generation| *generation)
            .unwrap_or(0)
    }

    /// Move `conversation_id` to a fresh generation and return it.
    ///
    /// Values come from one process-wide counter, so a generation is never
    /// reused even if the map entry were lost.
    pub fn bump(&self, conversation_id: &ConversationId) -> u64 {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.current.insert(conversation_id.clone(), next);
        next
    }
}
