//! Cache envelope and health types.
//!
//! Everything written to the conversation cache is wrapped in a
//! [`CacheEntry`] carrying its own expiry, so a read can reject a value the
//! backend kept slightly past its TTL.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A cached value with an absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Wrap `value` so that it expires `ttl` after `now`.
    pub fn new(value: T, ttl: Duration, now: DateTime<Utc>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { value, expires_at }
    }

    /// An entry is live strictly before its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Unwrap the value if the entry is still live at `now`.
    pub fn into_live(self, now: DateTime<Utc>) -> Option<T> {
        if self.is_expired_at(now) {
            None
        } else {
            Some(self.value)
        }
    }
}

/// Two-state reachability of the cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHealth {
    Up,
    Down,
}

impl fmt::Display for CacheHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheHealth::Up => write!(f, "up"),
            CacheHealth::Down => write!(f, "down"),
        }
    }
}

/// The kinds of per-conversation values held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Messages,
    Metadata,
}

impl CacheKind {
    pub const ALL: [CacheKind; 2] = [CacheKind::Messages, CacheKind::Metadata];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Messages => "messages",
            CacheKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The cached tail of a conversation.
///
/// `messages` holds the most recent messages in ascending sequence order;
/// `total` is the number of messages the conversation had when the window
/// was written, so a reader can tell whether the window is the whole
/// conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWindow {
    pub messages: Vec<Message>,
    pub total: u64,
}

impl MessageWindow {
    pub fn last_sequence(&self) -> u64 {
        self.messages.last().map(|m| m.sequence).unwrap_or(0)
    }

    /// Whether this window can answer a read for `limit` messages.
    pub fn covers(&self, limit: usize) -> bool {
        self.messages.len() >= limit || self.messages.len() as u64 >= self.total
    }

    /// The `limit` most recent messages, ascending.
    pub fn tail(&self, limit: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages[skip..].to_vec()
    }
}

/// Diagnostic snapshot of the cache, served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub backend: String,
    pub health: CacheHealth,
    pub connected: bool,
    pub ping_successful: bool,
    pub active_conversations: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_live_before_expiry() {
        let now = Utc::now();
        let entry = CacheEntry::new("v", Duration::from_secs(10), now);
        assert!(!entry.is_expired_at(now + chrono::Duration::seconds(9)));
        assert_eq!(entry.into_live(now), Some("v"));
    }

    #[test]
    fn test_entry_expired_at_boundary() {
        let now = Utc::now();
        let entry = CacheEntry::new(1u32, Duration::from_secs(10), now);
        assert!(entry.is_expired_at(now + chrono::Duration::seconds(10)));
        assert_eq!(entry.into_live(now + chrono::Duration::seconds(11)), None);
    }

    #[test]
    fn test_entry_huge_ttl_saturates() {
        let entry = CacheEntry::new((), Duration::MAX, Utc::now());
        assert!(!entry.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_window_covers_and_tail() {
        let window = MessageWindow {
            messages: Vec::new(),
            total: 0,
        };
        assert!(window.covers(10));
        assert!(window.tail(3).is_empty());
        assert_eq!(window.last_sequence(), 0);
    }

    #[test]
    fn test_health_serde() {
        assert_eq!(serde_json::to_string(&CacheHealth::Down).unwrap(), "\"down\"");
        assert_eq!(CacheKind::Messages.to_string(), "messages");
    }
}
