//! Wire frames exchanged over a real-time connection.
//!
//! Clients may send raw text (taken verbatim as message content) or a
//! JSON-encoded [`ClientFrame`]. The server always sends JSON-encoded
//! [`ServerFrame`]s.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Frame received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Submit message content to the conversation.
    Message { content: String },
    /// Keep-alive. The server answers with [`ServerFrame::Pong`].
    Ping,
}

impl ClientFrame {
    /// Interpret an inbound text frame.
    ///
    /// Text that is not a well-formed JSON frame is treated as message
    /// content, so plain-text clients keep working.
    pub fn from_text(text: &str) -> Self {
        if text.trim_start().starts_with('{') {
            if let Ok(frame) = serde_json::from_str::<ClientFrame>(text) {
                return frame;
            }
        }
        ClientFrame::Message {
            content: text.to_string(),
        }
    }
}

/// Frame sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A message accepted by the store, in broadcast order.
    Message { message: Message },
    /// A failure affecting only the receiving connection's last submission.
    Error { code: String, message: String },
    Pong,
}

impl ServerFrame {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
