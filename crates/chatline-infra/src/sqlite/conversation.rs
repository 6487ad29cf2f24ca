//! SQLite conversation store.
//!
//! Implements `ConversationStore` from `chatline-core` using sqlx with split
//! read/write pools, raw queries and private Row structs. A conversation row
//! is created by its first message, so a conversation without messages does
//! not exist.

use std::collections::BTreeSet;

use chatline_core::store::ConversationStore;
use chatline_types::error::StoreError;
use chatline_types::ids::{ConversationId, UserId};
use chatline_types::message::{
    ConversationMetadata, ConversationRecord, Message, MessageRole, NewMessage,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationStore`.
pub struct SqliteConversationStore {
    pool: DatabasePool,
}

impl SqliteConversationStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ConversationRow {
    id: String,
    message_count: i64,
    last_message_at: Option<String>,
    last_message: Option<String>,
    last_message_role: Option<String>,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            message_count: row.try_get("message_count")?,
            last_message_at: row.try_get("last_message_at")?,
            last_message: row.try_get("last_message")?,
            last_message_role: row.try_get("last_message_role")?,
        })
    }

    fn into_metadata(
        self,
        participant_ids: BTreeSet<UserId>,
    ) -> Result<ConversationMetadata, StoreError> {
        let conversation_id = ConversationId::parse(self.id)
            .map_err(|e| corrupt(format!("invalid conversation id: {e}")))?;
        let last_message_at = self
            .last_message_at
            .as_deref()
            .map(parse_datetime)
            .transpose()?;
        let last_message_role = self
            .last_message_role
            .as_deref()
            .map(|role| role.parse::<MessageRole>().map_err(corrupt))
            .transpose()?;

        Ok(ConversationMetadata {
            conversation_id,
            participant_ids,
            last_message_at,
            cached_at: None,
            message_count: self.message_count as u64,
            last_message: self.last_message,
            last_message_role,
        })
    }
}

struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    role: String,
    content: String,
    sequence: i64,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            sequence: row.try_get("sequence")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<Message, StoreError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| corrupt(format!("invalid message id: {e}")))?;
        let conversation_id = ConversationId::parse(self.conversation_id)
            .map_err(|e| corrupt(format!("invalid conversation id: {e}")))?;
        let sender_id = UserId::parse(self.sender_id)
            .map_err(|e| corrupt(format!("invalid sender id: {e}")))?;
        let role: MessageRole = self.role.parse().map_err(corrupt)?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            role,
            content: self.content,
            sequence: self.sequence as u64,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn corrupt(message: String) -> StoreError {
    StoreError::Unavailable(format!("corrupt row: {message}"))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// ConversationStore implementation
// ---------------------------------------------------------------------------

impl ConversationStore for SqliteConversationStore {
    async fn get(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<ConversationRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(unavailable)?
            .ok_or(StoreError::NotFound)?;
        let conversation = ConversationRow::from_row(&row).map_err(unavailable)?;

        let participant_rows = sqlx::query(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = ?",
        )
        .bind(conversation_id.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        let mut participant_ids = BTreeSet::new();
        for row in &participant_rows {
            let user_id: String = row.try_get("user_id").map_err(unavailable)?;
            participant_ids.insert(
                UserId::parse(user_id).map_err(|e| corrupt(format!("invalid user id: {e}")))?,
            );
        }

        // Newest `limit` rows, returned oldest first.
        let rows = sqlx::query(
            r#"SELECT * FROM (
                   SELECT * FROM conversation_messages
                   WHERE conversation_id = ?
                   ORDER BY sequence DESC
                   LIMIT ?
               ) ORDER BY sequence ASC"#,
        )
        .bind(conversation_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row = MessageRow::from_row(row).map_err(unavailable)?;
            messages.push(message_row.into_message()?);
        }

        Ok(ConversationRecord {
            messages,
            metadata: conversation.into_metadata(participant_ids)?,
        })
    }

    async fn append(&self, message: &NewMessage) -> Result<Message, StoreError> {
        let created_at = Utc::now();
        let id = Uuid::now_v7();
        let mut tx = self.pool.writer.begin().await.map_err(unavailable)?;

        sqlx::query(
            "INSERT INTO conversations (id, created_at) VALUES (?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(message.conversation_id.as_str())
        .bind(format_datetime(&created_at))
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        let row = sqlx::query(
            r#"UPDATE conversations
               SET message_count = message_count + 1,
                   last_message_at = ?, last_message = ?, last_message_role = ?
               WHERE id = ?
               RETURNING message_count"#,
        )
        .bind(format_datetime(&created_at))
        .bind(&message.content)
        .bind(message.role.to_string())
        .bind(message.conversation_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(unavailable)?;
        let sequence: i64 = row.try_get("message_count").map_err(unavailable)?;

        sqlx::query(
            r#"INSERT INTO conversation_messages (id, conversation_id, sender_id, role, content, sequence, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(message.conversation_id.as_str())
        .bind(message.sender_id.as_str())
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(sequence)
        .bind(format_datetime(&created_at))
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            r#"INSERT INTO conversation_participants (conversation_id, user_id, joined_at)
               VALUES (?, ?, ?) ON CONFLICT(conversation_id, user_id) DO NOTHING"#,
        )
        .bind(message.conversation_id.as_str())
        .bind(message.sender_id.as_str())
        .bind(format_datetime(&created_at))
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;

        Ok(Message {
            id,
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            role: message.role,
            content: message.content.clone(),
            sequence: sequence as u64,
            created_at,
        })
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool.reader)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
