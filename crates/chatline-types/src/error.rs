use thiserror::Error;

/// Failures reported by the durable conversation store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conversation not found")]
    NotFound,

    #[error("durable store unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a cache backend.
///
/// These never leave the cache layer; they are logged and turned into a
/// miss or a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation timed out")]
    Timeout,

    #[error("cache value could not be decoded: {0}")]
    Serialization(String),
}

/// Failures reported by the completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("completion provider is not configured")]
    Disabled,

    #[error("completion request failed: {0}")]
    Provider(String),

    #[error("completion provider rejected credentials")]
    AuthenticationFailed,

    #[error("completion provider rate limited the request")]
    RateLimited,

    #[error("completion response could not be decoded: {0}")]
    Deserialization(String),
}

/// Errors surfaced by the conversation subsystem to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("message rejected: {0}")]
    InvalidMessage(String),

    #[error("failed to persist message: {0}")]
    DurableWriteFailed(StoreError),

    #[error("failed to read conversation: {0}")]
    DurableReadFailed(StoreError),

    #[error("failed to deliver to connection: {0}")]
    ConnectionSendFailed(String),

    #[error("assistant reply failed: {0}")]
    CompletionFailed(CompletionError),
}

impl ChatError {
    /// Machine-readable code used in error frames and HTTP envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::InvalidMessage(_) => "INVALID_MESSAGE",
            ChatError::DurableWriteFailed(_) => "DURABLE_WRITE_FAILED",
            ChatError::DurableReadFailed(StoreError::NotFound) => "CONVERSATION_NOT_FOUND",
            ChatError::DurableReadFailed(_) => "DURABLE_READ_FAILED",
            ChatError::ConnectionSendFailed(_) => "CONNECTION_SEND_FAILED",
            ChatError::CompletionFailed(_) => "COMPLETION_FAILED",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChatError::DurableReadFailed(StoreError::NotFound)
                | ChatError::DurableWriteFailed(StoreError::NotFound)
        )
    }
}

/// Configuration that parsed but cannot be run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}
