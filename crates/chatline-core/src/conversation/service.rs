//! Read-through / write-through orchestration between cache and store.
//!
//! Reads are served from the cached message window when it can answer
//! them; otherwise the durable store is read and the cache is back-filled
//! in a spawned task so the caller never waits on the cache. Appends are
//! durable first; the cached window and metadata are then patched in place
//! under a per-conversation lock, or dropped when they cannot be patched
//! safely.
//!
//! A conversation whose cache update was missed (backend down, write
//! failed) is marked stale. Its cached values are purged before the cache
//! is read or written for it again, so entries from before an outage are
//! never served after it.
//!
//! Cache failures never leave this module. Durable failures always do.

use std::sync::Arc;

use chatline_types::cache::{CacheHealth, CacheKind, CacheStatus, MessageWindow};
use chatline_types::config::ChatlineConfig;
use chatline_types::error::ChatError;
use chatline_types::ids::ConversationId;
use chatline_types::message::{ConversationMetadata, ConversationRecord, Message, NewMessage};
use chrono::Utc;
use dashmap::DashSet;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::generation::Generations;
use crate::cache::{CacheBackend, CacheLayer, CacheStats, Lookup};
use crate::store::ConversationStore;
use crate::sync::KeyedLocks;

/// Conversation reads and writes with cache fallback.
///
/// Generic over `ConversationStore` and `CacheBackend` so the core never
/// depends on chatline-infra.
pub struct ConversationCacheService<S: ConversationStore, B: CacheBackend> {
    store: Arc<S>,
    writer: CacheWriter<B>,
    max_message_chars: usize,
}

impl<S: ConversationStore, B: CacheBackend> ConversationCacheService<S, B> {
    pub fn new(store: Arc<S>, cache: CacheLayer<B>, config: &ChatlineConfig) -> Self {
        Self {
            store,
            writer: CacheWriter {
                cache: Arc::new(cache),
                locks: KeyedLocks::new(),
                generations: Arc::new(Generations::new()),
                stale: Arc::new(DashSet::new()),
                window_size: config.cache.window_size.max(1),
            },
            max_message_chars: config.realtime.max_message_chars,
        }
    }

    /// Access the durable store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Access the cache layer.
    pub fn cache(&self) -> &CacheLayer<B> {
        &self.writer.cache
    }

    // --- Reads ---

    /// The `limit` most recent messages of a conversation, ascending by
    /// sequence.
    ///
    /// Served from the cache when the cached window holds at least `limit`
    /// messages or the whole conversation. Otherwise read from the durable
    /// store, with a non-blocking back-fill of the cache.
    pub async fn read_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        if let Lookup::Hit(window) = self
            .writer
            .cached::<MessageWindow>(CacheKind::Messages, conversation_id)
            .await
        {
            if window.covers(limit) {
                debug!(conversation_id = %conversation_id, limit, "messages served from cache");
                return Ok(window.tail(limit));
            }
        }

        let record = self
            .load(conversation_id, limit.max(self.writer.window_size))
            .await?;
        let skip = record.messages.len().saturating_sub(limit);
        Ok(record.messages[skip..].to_vec())
    }

    /// Conversation metadata, cache first with durable fallback.
    pub async fn get_metadata(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationMetadata, ChatError> {
        if let Lookup::Hit(metadata) = self
            .writer
            .cached::<ConversationMetadata>(CacheKind::Metadata, conversation_id)
            .await
        {
            debug!(conversation_id = %conversation_id, "metadata served from cache");
            return Ok(metadata);
        }

        let record = self.load(conversation_id, self.writer.window_size).await?;
        Ok(record.metadata)
    }

    /// Durable read plus a spawned cache fill.
    async fn load(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<ConversationRecord, ChatError> {
        // Captured before the read so a write landing in between makes the
        // fill stale.
        let generation = self.writer.generations.current(conversation_id);
        let record = self
            .store
            .get(conversation_id, limit)
            .await
            .map_err(ChatError::DurableReadFailed)?;

        let writer = self.writer.clone();
        let fill_id = conversation_id.clone();
        let fill_record = record.clone();
        tokio::spawn(async move {
            writer.fill(&fill_id, generation, fill_record).await;
        });

        Ok(record)
    }

    // --- Writes ---

    /// Persist a message and fold it into the cache.
    ///
    /// The durable write happens first; if it fails the cache is not
    /// touched. Cache problems after a successful write are logged and do
    /// not fail the call.
    pub async fn append_message(&self, message: NewMessage) -> Result<Message, ChatError> {
        self.validate(&message)?;

        // Anything that touches the conversation before this append reaches
        // the cache moves the generation.
        let generation = self.writer.generations.current(&message.conversation_id);
        let stored = self
            .store
            .append(&message)
            .await
            .map_err(ChatError::DurableWriteFailed)?;
        info!(
            conversation_id = %stored.conversation_id,
            sequence = stored.sequence,
            role = %stored.role,
            "message persisted"
        );

        self.writer.apply_append(&stored, generation).await;
        Ok(stored)
    }

    fn validate(&self, message: &NewMessage) -> Result<(), ChatError> {
        if message.content.trim().is_empty() {
            return Err(ChatError::InvalidMessage("content is empty".to_string()));
        }
        let chars = message.content.chars().count();
        if chars > self.max_message_chars {
            return Err(ChatError::InvalidMessage(format!(
                "content is {chars} characters, limit is {}",
                self.max_message_chars
            )));
        }
        Ok(())
    }

    /// Drop both cached values for a conversation. The store is untouched.
    ///
    /// Returns whether anything was removed.
    pub async fn invalidate(&self, conversation_id: &ConversationId) -> bool {
        self.writer.invalidate(conversation_id).await
    }

    /// Delete a conversation from the store, then from the cache.
    pub async fn delete_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), ChatError> {
        self.store
            .delete(conversation_id)
            .await
            .map_err(ChatError::DurableWriteFailed)?;
        self.writer.invalidate(conversation_id).await;
        info!(conversation_id = %conversation_id, "conversation deleted");
        Ok(())
    }

    // --- Administration ---

    pub async fn cache_health(&self) -> CacheHealth {
        self.writer.cache.health().await
    }

    pub async fn cache_status(&self) -> CacheStatus {
        self.writer.cache.status().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.writer.cache.stats()
    }

    /// Evict every cached conversation. Returns the number of keys removed.
    pub async fn clear_cache(&self) -> usize {
        let mut removed = 0;
        for kind in CacheKind::ALL {
            removed += self.writer.cache.clear(kind).await;
        }
        removed
    }

    /// Conversations with a cached message window.
    pub async fn active_conversations(&self) -> Vec<ConversationId> {
        self.writer.cache.conversations(CacheKind::Messages).await
    }

    /// Whether the durable store answers.
    pub async fn store_reachable(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

/// The part of the service that mutates the cache. Cloned into fill tasks.
struct CacheWriter<B: CacheBackend> {
    cache: Arc<CacheLayer<B>>,
    locks: KeyedLocks<ConversationId>,
    generations: Arc<Generations>,
    /// Conversations whose cached values may be older than the store.
    stale: Arc<DashSet<ConversationId>>,
    window_size: usize,
}

impl<B: CacheBackend> Clone for CacheWriter<B> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            locks: self.locks.clone(),
            generations: Arc::clone(&self.generations),
            stale: Arc::clone(&self.stale),
            window_size: self.window_size,
        }
    }
}

impl<B: CacheBackend> CacheWriter<B> {
    /// Cache read that never returns values from before a missed update.
    async fn cached<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        conversation_id: &ConversationId,
    ) -> Lookup<T> {
        if self.stale.contains(conversation_id) {
            let _guard = self.locks.lock(conversation_id).await;
            if !self.settle(conversation_id).await {
                return Lookup::Miss;
            }
        }
        self.cache.get(kind, conversation_id).await
    }

    fn mark_stale(&self, conversation_id: &ConversationId) {
        if self.stale.insert(conversation_id.clone()) {
            warn!(
                conversation_id = %conversation_id,
                "cache update missed, entries will be purged before reuse"
            );
        }
    }

    /// Purge the cached values of a stale conversation. Returns false while
    /// the backend cannot confirm the purge. Caller holds the lock.
    async fn settle(&self, conversation_id: &ConversationId) -> bool {
        if !self.stale.contains(conversation_id) {
            return true;
        }
        let messages = self.cache.remove(CacheKind::Messages, conversation_id).await;
        let metadata = self.cache.remove(CacheKind::Metadata, conversation_id).await;
        if messages.is_err() || metadata.is_err() {
            return false;
        }
        self.stale.remove(conversation_id);
        info!(conversation_id = %conversation_id, "purged cache entries older than the store");
        true
    }

    /// Write a durable read into the cache unless the conversation changed
    /// since `generation` was captured.
    async fn fill(&self, conversation_id: &ConversationId, generation: u64, record: ConversationRecord) {
        let _guard = self.locks.lock(conversation_id).await;
        if self.generations.current(conversation_id) != generation {
            debug!(conversation_id = %conversation_id, "dropping stale cache fill");
            return;
        }
        if !self.settle(conversation_id).await {
            return;
        }

        let skip = record.messages.len().saturating_sub(self.window_size);
        let window = MessageWindow {
            messages: record.messages[skip..].to_vec(),
            total: record.metadata.message_count,
        };
        let mut metadata = record.metadata;
        metadata.cached_at = Some(Utc::now());

        let messages_ok = self
            .cache
            .set(CacheKind::Messages, conversation_id, &window)
            .await;
        let metadata_ok = self
            .cache
            .set(CacheKind::Metadata, conversation_id, &metadata)
            .await;
        if !(messages_ok && metadata_ok) {
            self.mark_stale(conversation_id);
        }
        debug!(
            conversation_id = %conversation_id,
            cached = window.messages.len(),
            messages_ok,
            metadata_ok,
            "cache filled from durable store"
        );
    }

    /// Fold a freshly persisted message into the cached window and metadata.
    ///
    /// `before` is the generation captured ahead of the durable write. If
    /// it moved, another writer got in between and a first message may no
    /// longer seed the cache.
    async fn apply_append(&self, message: &Message, before: u64) {
        let conversation_id = &message.conversation_id;
        let _guard = self.locks.lock(conversation_id).await;
        let contended = self.generations.current(conversation_id) != before;
        self.generations.bump(conversation_id);

        if !self.settle(conversation_id).await {
            return;
        }
        let window_ok = self.append_to_window(message, contended).await;
        let metadata_ok = self.append_to_metadata(message, contended).await;
        if !(window_ok && metadata_ok) {
            self.mark_stale(conversation_id);
        }
    }

    /// Returns false when the cached window could not be brought in line.
    async fn append_to_window(&self, message: &Message, contended: bool) -> bool {
        let conversation_id = &message.conversation_id;
        let mut window = match self
            .cache
            .lookup::<MessageWindow>(CacheKind::Messages, conversation_id)
            .await
        {
            Ok(Lookup::Hit(window)) => window,
            // An uncontended first message makes the whole conversation known.
            Ok(Lookup::Miss) if message.sequence == 1 && !contended => MessageWindow {
                messages: Vec::new(),
                total: 0,
            },
            Ok(Lookup::Miss) => return true,
            Err(_) => return false,
        };

        let last = window.last_sequence().max(window.total);
        if message.sequence == last + 1 {
            window.messages.push(message.clone());
            window.total = message.sequence;
            let excess = window.messages.len().saturating_sub(self.window_size);
            window.messages.drain(..excess);
            self.cache
                .set(CacheKind::Messages, conversation_id, &window)
                .await
        } else if message.sequence > last {
            warn!(
                conversation_id = %conversation_id,
                cached_through = last,
                sequence = message.sequence,
                "cached window has a gap, dropping it"
            );
            self.cache
                .remove(CacheKind::Messages, conversation_id)
                .await
                .is_ok()
        } else {
            true
        }
    }

    /// Returns false when the cached metadata could not be brought in line.
    async fn append_to_metadata(&self, message: &Message, contended: bool) -> bool {
        let conversation_id = &message.conversation_id;
        let mut metadata = match self
            .cache
            .lookup::<ConversationMetadata>(CacheKind::Metadata, conversation_id)
            .await
        {
            Ok(Lookup::Hit(metadata)) => metadata,
            Ok(Lookup::Miss) if message.sequence == 1 && !contended => {
                ConversationMetadata::empty(conversation_id.clone())
            }
            Ok(Lookup::Miss) => return true,
            Err(_) => return false,
        };

        if message.sequence == metadata.message_count + 1 {
            metadata.record(message);
            metadata.cached_at = Some(Utc::now());
            self.cache
                .set(CacheKind::Metadata, conversation_id, &metadata)
                .await
        } else if message.sequence > metadata.message_count {
            self.cache
                .remove(CacheKind::Metadata, conversation_id)
                .await
                .is_ok()
        } else {
            true
        }
    }

    async fn invalidate(&self, conversation_id: &ConversationId) -> bool {
        let _guard = self.locks.lock(conversation_id).await;
        self.generations.bump(conversation_id);
        let messages = self.cache.remove(CacheKind::Messages, conversation_id).await;
        let metadata = self.cache.remove(CacheKind::Metadata, conversation_id).await;
        if messages.is_ok() && metadata.is_ok() {
            self.stale.remove(conversation_id);
        } else {
            self.mark_stale(conversation_id);
        }
        info!(conversation_id = %conversation_id, "conversation cache invalidated");
        matches!(messages, Ok(true)) || matches!(metadata, Ok(true))
    }
}
