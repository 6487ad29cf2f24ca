//! In-memory fakes shared by the core unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chatline_types::error::{CacheError, StoreError};
use chatline_types::ids::ConversationId;
use chatline_types::message::{ConversationMetadata, ConversationRecord, Message, NewMessage};
use chrono::Utc;
use uuid::Uuid;

use crate::cache::{CacheBackend, MemoryCacheBackend};
use crate::store::ConversationStore;

/// Durable store fake with failure switches and a read counter.
#[derive(Default)]
pub struct FakeStore {
    conversations: Mutex<HashMap<ConversationId, Vec<Message>>>,
    fail_appends: AtomicBool,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
    slow_sequence: Mutex<Option<(u64, Duration)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Hold back the append that is assigned `sequence` by `delay`, after
    /// the sequence is taken.
    pub fn delay_sequence(&self, sequence: u64, delay: Duration) {
        *self.slow_sequence.lock().unwrap() = Some((sequence, delay));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn message_count(&self, conversation_id: &ConversationId) -> usize {
        self.conversations
            .lock()
            .unwrap()
            .get(conversation_id)
            .map_or(0, Vec::len)
    }
}

impl ConversationStore for FakeStore {
    async fn get(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<ConversationRecord, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fake store offline".to_string()));
        }
        let conversations = self.conversations.lock().unwrap();
        let all = conversations
            .get(conversation_id)
            .ok_or(StoreError::NotFound)?;

        let mut metadata = ConversationMetadata::empty(conversation_id.clone());
        for message in all {
            metadata.record(message);
        }
        let skip = all.len().saturating_sub(limit);
        Ok(ConversationRecord {
            messages: all[skip..].to_vec(),
            metadata,
        })
    }

    async fn append(&self, message: &NewMessage) -> Result<Message, StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fake store offline".to_string()));
        }
        let stored = {
            let mut conversations = self.conversations.lock().unwrap();
            let log = conversations
                .entry(message.conversation_id.clone())
                .or_default();
            let stored = Message {
                id: Uuid::now_v7(),
                conversation_id: message.conversation_id.clone(),
                sender_id: message.sender_id.clone(),
                role: message.role,
                content: message.content.clone(),
                sequence: log.len() as u64 + 1,
                created_at: Utc::now(),
            };
            log.push(stored.clone());
            stored
        };

        let slow = *self.slow_sequence.lock().unwrap();
        if let Some((sequence, delay)) = slow {
            if stored.sequence == sequence {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(stored)
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), StoreError> {
        match self.conversations.lock().unwrap().remove(conversation_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Cache backend that can be switched off or slowed down.
#[derive(Default)]
pub struct FlakyCache {
    inner: MemoryCacheBackend,
    down: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of backend calls that got past the layer.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl CacheBackend for FlakyCache {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.enter().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.enter().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.enter().await?;
        self.inner.delete(key).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.enter().await?;
        self.inner.keys(prefix).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.enter().await
    }
}
