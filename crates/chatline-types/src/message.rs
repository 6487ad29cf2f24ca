//! Conversation message and metadata types.
//!
//! Messages are immutable once the durable store has accepted them. The
//! store assigns the per-conversation `sequence`, which is the ordering key
//! used everywhere else (cache windows, history reads, broadcasts).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{ConversationId, UserId};

/// Author role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A message submitted for persistence, before the store assigns its
/// identity and ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub role: MessageRole,
    pub content: String,
}

/// A message accepted by the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub role: MessageRole,
    pub content: String,
    /// Server-assigned ordering key, starting at 1 and gap-free within a
    /// conversation.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

/// Per-conversation summary kept next to the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub conversation_id: ConversationId,
    pub participant_ids: BTreeSet<UserId>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Set when this value was written into the cache.
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_role: Option<MessageRole>,
}

impl ConversationMetadata {
    /// Metadata for a conversation that has no messages yet.
    pub fn empty(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            participant_ids: BTreeSet::new(),
            last_message_at: None,
            cached_at: None,
            message_count: 0,
            last_message: None,
            last_message_role: None,
        }
    }

    /// Fold a newly accepted message into the summary.
    ///
    /// Messages at or below the current count are already reflected and are
    /// ignored, so replaying an append is harmless.
    pub fn record(&mut self, message: &Message) {
        if message.sequence <= self.message_count {
            return;
        }
        self.participant_ids.insert(message.sender_id.clone());
        self.last_message_at = Some(message.created_at);
        self.message_count = message.sequence;
        self.last_message = Some(message.content.clone());
        self.last_message_role = Some(message.role);
    }
}

/// Everything the durable store returns for one conversation read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Most recent messages, ascending by sequence.
    pub messages: Vec<Message>,
    pub metadata: ConversationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(seq: u64, sender: &str, content: &str) -> Message {
        Message {
            id: Uuid::now_v7(),
            conversation_id: ConversationId::parse("c1").unwrap(),
            sender_id: UserId::parse(sender).unwrap(),
            role: MessageRole::User,
            content: content.to_string(),
            sequence: seq,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let parsed: MessageRole = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }
        assert!("robot".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_metadata_record_tracks_latest() {
        let mut meta = ConversationMetadata::empty(ConversationId::parse("c1").unwrap());
        meta.record(&message(1, "alice", "hi"));
        meta.record(&message(2, "bob", "hello"));

        assert_eq!(meta.message_count, 2);
        assert_eq!(meta.participant_ids.len(), 2);
        assert_eq!(meta.last_message.as_deref(), Some("hello"));
        assert_eq!(meta.last_message_role, Some(MessageRole::User));
    }

    #[test]
    fn test_metadata_record_ignores_replayed_message() {
        let mut meta = ConversationMetadata::empty(ConversationId::parse("c1").unwrap());
        meta.record(&message(1, "alice", "first"));
        meta.record(&message(2, "alice", "second"));
        meta.record(&message(1, "carol", "first"));

        assert_eq!(meta.message_count, 2);
        assert_eq!(meta.last_message.as_deref(), Some("second"));
        assert!(!meta.participant_ids.contains(&UserId::parse("carol").unwrap()));
    }

    #[test]
    fn test_message_serialize() {
        let json = serde_json::to_string(&message(7, "alice", "hello")).unwrap();
        assert!(json.contains("\"sequence\":7"));
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"conversation_id\":\"c1\""));
    }
}
