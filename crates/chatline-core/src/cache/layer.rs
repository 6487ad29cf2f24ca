//! TTL cache layer with explicit Up/Down health.
//!
//! `CacheLayer` wraps a [`CacheBackend`] and gives callers a contract with
//! no error path: reads return [`Lookup::Hit`] or [`Lookup::Miss`], writes
//! and deletes report whether they landed. Backend failures, timeouts and
//! undecodable values are logged and absorbed here.
//!
//! Health follows a small circuit breaker. The first backend failure flips
//! the layer to `Down`; while Down, operations skip the backend entirely
//! and return Miss/no-op until the retry interval has elapsed, at which
//! point one operation is let through as a probe. A successful call flips
//! the layer back to `Up`.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatline_types::cache::{CacheEntry, CacheHealth, CacheKind, CacheStatus};
use chatline_types::config::CacheConfig;
use chatline_types::error::CacheError;
use chatline_types::ids::ConversationId;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::backend::CacheBackend;

/// Result of a cache read. A miss covers absent, expired, undecodable and
/// unreachable alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Hit(T),
    Miss,
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss => None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    health: CacheHealth,
    /// When the layer went Down, or when it was last probed while Down.
    down_since: Option<Instant>,
    last_error: Option<String>,
}

/// Lock-free operation counters.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes_attempted: AtomicU64,
    writes_failed: AtomicU64,
    skipped: AtomicU64,
}

/// Snapshot of the cache layer counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes_attempted: u64,
    pub writes_failed: u64,
    /// Operations answered without touching the backend because it was Down.
    pub skipped: u64,
}

/// Conversation-keyed TTL cache over a [`CacheBackend`].
pub struct CacheLayer<B: CacheBackend> {
    backend: B,
    key_prefix: String,
    ttl: Duration,
    op_timeout: Duration,
    retry_interval: Duration,
    state: Mutex<BreakerState>,
    counters: Counters,
}

impl<B: CacheBackend> CacheLayer<B> {
    pub fn new(backend: B, config: &CacheConfig) -> Self {
        Self {
            backend,
            key_prefix: config.key_prefix.clone(),
            ttl: config.ttl(),
            op_timeout: config.op_timeout(),
            retry_interval: config.retry_interval(),
            state: Mutex::new(BreakerState {
                health: CacheHealth::Up,
                down_since: None,
                last_error: None,
            }),
            counters: Counters::default(),
        }
    }

    /// Access the wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Default time-to-live for new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `{prefix}:{kind}:{conversation_id}`
    pub fn key(&self, kind: CacheKind, conversation_id: &ConversationId) -> String {
        format!("{}:{}:{}", self.key_prefix, kind, conversation_id)
    }

    fn kind_prefix(&self, kind: CacheKind) -> String {
        format!("{}:{}:", self.key_prefix, kind)
    }

    // --- Reads and writes ---

    /// Read a value. Expired, undecodable and unreachable all yield `Miss`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        conversation_id: &ConversationId,
    ) -> Lookup<T> {
        self.lookup(kind, conversation_id)
            .await
            .unwrap_or(Lookup::Miss)
    }

    /// Read a value, reporting an unreachable backend as an error instead
    /// of a miss. Expired and undecodable values are still `Miss`.
    pub async fn lookup<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        conversation_id: &ConversationId,
    ) -> Result<Lookup<T>, CacheError> {
        let key = self.key(kind, conversation_id);
        if !self.admit() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Err(skipped());
        }

        let raw = match self.call(self.backend.get(&key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(%key, "cache miss");
                return Ok(Lookup::Miss);
            }
            Err(err) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(%key, error = %err, "cache read failed, treating as miss");
                return Err(err);
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(%key, error = %err, "discarding undecodable cache value");
                let _ = self.call(self.backend.delete(&key)).await;
                return Ok(Lookup::Miss);
            }
        };

        match entry.into_live(Utc::now()) {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(%key, "cache hit");
                Ok(Lookup::Hit(value))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(%key, "cache entry past expiry");
                Ok(Lookup::Miss)
            }
        }
    }

    /// Store a value with the default TTL. Returns whether it landed.
    pub async fn set<T: Serialize>(
        &self,
        kind: CacheKind,
        conversation_id: &ConversationId,
        value: &T,
    ) -> bool {
        self.set_with_ttl(kind, conversation_id, value, self.ttl).await
    }

    /// Store a value with an explicit TTL. Returns whether it landed.
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        kind: CacheKind,
        conversation_id: &ConversationId,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let key = self.key(kind, conversation_id);
        self.counters.writes_attempted.fetch_add(1, Ordering::Relaxed);
        if !self.admit() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            self.counters.writes_failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let payload = match serde_json::to_string(&CacheEntry::new(value, ttl, Utc::now())) {
            Ok(payload) => payload,
            Err(err) => {
                self.counters.writes_failed.fetch_add(1, Ordering::Relaxed);
                warn!(%key, error = %err, "failed to encode cache value");
                return false;
            }
        };

        match self.call(self.backend.set(&key, payload, ttl)).await {
            Ok(()) => {
                debug!(%key, ttl_secs = ttl.as_secs(), "cache write");
                true
            }
            Err(err) => {
                self.counters.writes_failed.fetch_add(1, Ordering::Relaxed);
                warn!(%key, error = %err, "cache write failed");
                false
            }
        }
    }

    /// Remove a value. Returns whether a live entry was removed.
    pub async fn delete(&self, kind: CacheKind, conversation_id: &ConversationId) -> bool {
        self.remove(kind, conversation_id).await.unwrap_or(false)
    }

    /// Remove a value, reporting an unreachable backend as an error.
    ///
    /// `Ok` means the key is gone, whether or not it existed.
    pub async fn remove(
        &self,
        kind: CacheKind,
        conversation_id: &ConversationId,
    ) -> Result<bool, CacheError> {
        let key = self.key(kind, conversation_id);
        if !self.admit() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Err(skipped());
        }
        match self.call(self.backend.delete(&key)).await {
            Ok(deleted) => {
                debug!(%key, deleted, "cache delete");
                Ok(deleted)
            }
            Err(err) => {
                warn!(%key, error = %err, "cache delete failed");
                Err(err)
            }
        }
    }

    /// Re-arm an entry's expiry without changing its value.
    ///
    /// Returns `false` when there was no live entry to refresh.
    pub async fn refresh_ttl(
        &self,
        kind: CacheKind,
        conversation_id: &ConversationId,
        ttl: Duration,
    ) -> bool {
        match self.get::<serde_json::Value>(kind, conversation_id).await {
            Lookup::Hit(value) => self.set_with_ttl(kind, conversation_id, &value, ttl).await,
            Lookup::Miss => false,
        }
    }

    // --- Administration ---

    /// Conversations that currently have a live entry of `kind`.
    pub async fn conversations(&self, kind: CacheKind) -> Vec<ConversationId> {
        let prefix = self.kind_prefix(kind);
        if !self.admit() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        }
        match self.call(self.backend.keys(&prefix)).await {
            Ok(keys) => keys
                .iter()
                .filter_map(|key| key.strip_prefix(&prefix))
                .filter_map(|id| ConversationId::parse(id).ok())
                .collect(),
            Err(err) => {
                warn!(error = %err, "failed to list cache keys");
                Vec::new()
            }
        }
    }

    /// Delete every entry of `kind`. Returns how many were removed.
    pub async fn clear(&self, kind: CacheKind) -> usize {
        let mut removed = 0;
        for conversation_id in self.conversations(kind).await {
            if self.delete(kind, &conversation_id).await {
                removed += 1;
            }
        }
        info!(%kind, removed, "cleared cache entries");
        removed
    }

    /// Probe the backend and return the resulting health.
    pub async fn health(&self) -> CacheHealth {
        match self.call(self.backend.ping()).await {
            Ok(()) => CacheHealth::Up,
            Err(err) => {
                debug!(error = %err, "cache health probe failed");
                CacheHealth::Down
            }
        }
    }

    /// Last known health, without probing.
    pub fn current_health(&self) -> CacheHealth {
        self.lock_state().health
    }

    /// Probe the backend and assemble a status report.
    pub async fn status(&self) -> CacheStatus {
        let ping = self.call(self.backend.ping()).await;
        let ping_successful = ping.is_ok();
        let active_conversations = if ping_successful {
            self.conversations(CacheKind::Messages).await.len()
        } else {
            0
        };
        let state = self.lock_state();
        CacheStatus {
            backend: self.backend.name().to_string(),
            health: state.health,
            connected: state.health == CacheHealth::Up,
            ping_successful,
            active_conversations,
            last_error: state.last_error.clone(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes_attempted: self.counters.writes_attempted.load(Ordering::Relaxed),
            writes_failed: self.counters.writes_failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    // --- Breaker ---

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // A poisoned lock only means a panic elsewhere; the state is still
        // a valid snapshot.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether an operation may touch the backend right now.
    fn admit(&self) -> bool {
        let mut state = self.lock_state();
        match state.health {
            CacheHealth::Up => true,
            CacheHealth::Down => {
                let due = state
                    .down_since
                    .is_none_or(|since| since.elapsed() >= self.retry_interval);
                if due {
                    state.down_since = Some(Instant::now());
                }
                due
            }
        }
    }

    /// Run a backend call under the operation timeout and record the
    /// outcome in the breaker.
    async fn call<T>(&self, op: impl Future<Output = Result<T, CacheError>>) -> Result<T, CacheError> {
        let result = match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        };

        let mut state = self.lock_state();
        match &result {
            Ok(_) => {
                if state.health == CacheHealth::Down {
                    info!(backend = self.backend.name(), "cache backend recovered");
                }
                state.health = CacheHealth::Up;
                state.down_since = None;
            }
            Err(err) => {
                if state.health == CacheHealth::Up {
                    warn!(backend = self.backend.name(), error = %err, "cache backend down, falling back to durable store");
                    state.down_since = Some(Instant::now());
                }
                state.health = CacheHealth::Down;
                state.last_error = Some(err.to_string());
            }
        }
        result
    }
}

fn skipped() -> CacheError {
    CacheError::Unavailable("backend marked down, retry not due".to_string())
}
