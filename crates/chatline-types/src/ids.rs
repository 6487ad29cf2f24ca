//! Opaque identifiers for conversations and participants.
//!
//! Both identifiers are caller-supplied strings (they arrive in WebSocket
//! paths and REST routes), so they are validated once at the edge and then
//! carried around as newtypes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of an identifier in bytes.
pub const MAX_ID_LEN: usize = 128;

/// Reasons an identifier string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier must not be empty")]
    Empty,

    #[error("identifier exceeds {MAX_ID_LEN} bytes")]
    TooLong,

    #[error("identifier contains invalid character '{0}'")]
    InvalidChar(char),
}

/// Cache keys are `prefix:kind:id`, so ids may not contain `:`.
fn validate(raw: &str) -> Result<(), IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if raw.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    if let Some(c) = raw.chars().find(|c| c.is_whitespace() || c.is_control() || *c == ':') {
        return Err(IdError::InvalidChar(c));
    }
    Ok(())
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier.
            pub fn parse(raw: impl Into<String>) -> Result<Self, IdError> {
                let raw = raw.into();
                validate(&raw)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Stable identifier of a conversation.
    ConversationId
);

opaque_id!(
    /// Identifier of a conversation participant.
    UserId
);

/// Sender id recorded on assistant replies.
pub const ASSISTANT_USER_ID: &str = "assistant";

impl UserId {
    /// The participant that authors completion-provider replies.
    pub fn assistant() -> Self {
        Self(ASSISTANT_USER_ID.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_uuid_like_ids() {
        let id: ConversationId = "0190a5b2-7c1e-7000-8000-000000000001".parse().unwrap();
        assert_eq!(id.as_str(), "0190a5b2-7c1e-7000-8000-000000000001");
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(UserId::parse(""), Err(IdError::Empty));
    }

    #[test]
    fn test_parse_rejects_separator_and_whitespace() {
        assert_eq!(
            ConversationId::parse("a:b"),
            Err(IdError::InvalidChar(':'))
        );
        assert_eq!(UserId::parse("a b"), Err(IdError::InvalidChar(' ')));
    }

    #[test]
    fn test_parse_rejects_overlong() {
        let raw = "x".repeat(MAX_ID_LEN + 1);
        assert_eq!(ConversationId::parse(raw), Err(IdError::TooLong));
    }

    #[test]
    fn test_assistant_id_is_valid() {
        let id = UserId::assistant();
        assert_eq!(UserId::parse(id.as_str()), Ok(id));
    }

    #[test]
    fn test_serde_validates() {
        let id: UserId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"alice\"");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }
}
