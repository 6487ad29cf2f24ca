//! CompletionProvider trait definition.
//!
//! The completion provider is an opaque upstream that turns a conversation
//! context into assistant reply text. Its latency and failures are passed
//! through to the caller unmodified.

use chatline_types::error::CompletionError;
use chatline_types::ids::ConversationId;
use chatline_types::message::Message;

/// Input to a completion request.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub conversation_id: ConversationId,
    /// Recent messages, ascending by sequence, ending with the message being
    /// answered.
    pub messages: Vec<Message>,
}

/// Trait for assistant reply backends.
///
/// Implementations live in chatline-infra (e.g., `HttpCompletionProvider`).
pub trait CompletionProvider: Send + Sync + 'static {
    /// Human-readable provider name for logs.
    fn name(&self) -> &str;

    /// Produce reply content for the given context.
    fn generate(
        &self,
        context: &ConversationContext,
    ) -> impl std::future::Future<Output = Result<String, CompletionError>> + Send;
}

/// Placeholder provider used when assistant replies are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompletion;

impl CompletionProvider for NoCompletion {
    fn name(&self) -> &str {
        "none"
    }

    async fn generate(&self, _context: &ConversationContext) -> Result<String, CompletionError> {
        Err(CompletionError::Disabled)
    }
}
