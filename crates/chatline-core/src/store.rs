//! ConversationStore trait definition.
//!
//! The durable store is the system of record for messages and metadata.
//! Implementations live in chatline-infra (e.g., `SqliteConversationStore`).

use chatline_types::error::StoreError;
use chatline_types::ids::ConversationId;
use chatline_types::message::{ConversationRecord, Message, NewMessage};

/// Durable, key-value-by-conversation persistence.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ConversationStore: Send + Sync + 'static {
    /// Load a conversation: its metadata and the `limit` most recent
    /// messages in ascending sequence order.
    ///
    /// Returns `StoreError::NotFound` for a conversation with no messages.
    fn get(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<ConversationRecord, StoreError>> + Send;

    /// Persist a message, creating the conversation on first use.
    ///
    /// The store assigns the message id, creation time and the next
    /// per-conversation sequence number; the returned message carries them.
    fn append(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<Message, StoreError>> + Send;

    /// Delete a conversation and all of its messages.
    fn delete(
        &self,
        conversation_id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Cheap reachability probe for status reporting.
    fn ping(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
