//! Real-time connection identity and lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ids::{ConversationId, UserId};

/// Unique identifier of one live connection (one device, one socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a registered connection.
///
/// A `(user_id, conversation_id)` pair may own several handles (multiple
/// devices); each is removed independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub conversation_id: ConversationId,
}

/// Lifecycle of a connection.
///
/// `Connecting -> Open -> Closing -> Closed`. A connection that never opens
/// may go straight from `Connecting` to `Closing`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid connection transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        use ConnectionState::*;
        assert!(Connecting.can_transition_to(Open));
        assert!(Open.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
        assert!(Connecting.can_transition_to(Closing));
    }

    #[test]
    fn test_closed_is_terminal() {
        use ConnectionState::*;
        assert!(Closed.is_terminal());
        for next in [Connecting, Open, Closing, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_reopen() {
        use ConnectionState::*;
        assert!(!Closing.can_transition_to(Open));
        assert!(!Open.can_transition_to(Connecting));
    }

    #[test]
    fn test_transition_error_display() {
        let err = TransitionError {
            from: ConnectionState::Closed,
            to: ConnectionState::Open,
        };
        assert_eq!(err.to_string(), "invalid connection transition: closed -> open");
    }
}
