//! Real-time dispatcher.
//!
//! Turns inbound client messages into stored messages and fans them out to
//! every live connection of the conversation. Append and broadcast run
//! under a per-conversation lock, and each connection drains a FIFO queue,
//! so every client observes messages in durable-acceptance order.
//!
//! Sends to different connections run concurrently and are each bounded by
//! the configured send timeout. A connection that cannot keep up is closed
//! and dropped from the registry; it never holds up the rest.

use std::sync::Arc;
use std::time::Duration;

use chatline_types::config::{ChatlineConfig, EchoPolicy};
use chatline_types::connection::{ConnectionHandle, ConnectionId, ConnectionState};
use chatline_types::error::ChatError;
use chatline_types::frame::ServerFrame;
use chatline_types::ids::{ConversationId, UserId};
use chatline_types::message::{Message, MessageRole, NewMessage};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::connection::{ConnectionChannel, ConnectionSession};
use super::registry::ConnectionRegistry;
use crate::cache::CacheBackend;
use crate::completion::{CompletionProvider, ConversationContext, NoCompletion};
use crate::conversation::ConversationCacheService;
use crate::store::ConversationStore;
use crate::sync::KeyedLocks;

/// Connects transports, the conversation cache service and the registry.
///
/// Cheap to clone; clones share all state.
pub struct Dispatcher<S, B, P = NoCompletion>
where
    S: ConversationStore,
    B: CacheBackend,
    P: CompletionProvider,
{
    service: Arc<ConversationCacheService<S, B>>,
    registry: Arc<ConnectionRegistry>,
    completion: Option<Arc<P>>,
    order: KeyedLocks<ConversationId>,
    send_timeout: Duration,
    outbound_buffer: usize,
    echo: EchoPolicy,
    context_messages: usize,
}

impl<S, B, P> Clone for Dispatcher<S, B, P>
where
    S: ConversationStore,
    B: CacheBackend,
    P: CompletionProvider,
{
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            registry: Arc::clone(&self.registry),
            completion: self.completion.clone(),
            order: self.order.clone(),
            send_timeout: self.send_timeout,
            outbound_buffer: self.outbound_buffer,
            echo: self.echo,
            context_messages: self.context_messages,
        }
    }
}

impl<S, B> Dispatcher<S, B, NoCompletion>
where
    S: ConversationStore,
    B: CacheBackend,
{
    /// Create a dispatcher without assistant replies.
    pub fn new(
        service: Arc<ConversationCacheService<S, B>>,
        registry: Arc<ConnectionRegistry>,
        config: &ChatlineConfig,
    ) -> Self {
        Self {
            service,
            registry,
            completion: None,
            order: KeyedLocks::new(),
            send_timeout: config.realtime.send_timeout(),
            outbound_buffer: config.realtime.outbound_buffer,
            echo: config.realtime.echo,
            context_messages: config.completion.context_messages.max(1),
        }
    }
}

impl<S, B, P> Dispatcher<S, B, P>
where
    S: ConversationStore,
    B: CacheBackend,
    P: CompletionProvider,
{
    /// Answer user messages with `provider`. `None` disables replies.
    pub fn with_completion<Q: CompletionProvider>(self, provider: Option<Arc<Q>>) -> Dispatcher<S, B, Q> {
        Dispatcher {
            service: self.service,
            registry: self.registry,
            completion: provider,
            order: self.order,
            send_timeout: self.send_timeout,
            outbound_buffer: self.outbound_buffer,
            echo: self.echo,
            context_messages: self.context_messages,
        }
    }

    pub fn service(&self) -> &ConversationCacheService<S, B> {
        &self.service
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    // --- Connection lifecycle ---

    /// Register a new connection and open it.
    pub fn on_connect(&self, user_id: UserId, conversation_id: ConversationId) -> ConnectionSession {
        let (channel, outbound) = ConnectionChannel::new(self.outbound_buffer);
        let cancel = channel.cancel_token();
        let handle = self
            .registry
            .register(user_id, conversation_id, channel.clone());
        if let Err(err) = channel.lifecycle().transition(ConnectionState::Open) {
            warn!(connection_id = %handle.id, error = %err, "connection did not open");
        }
        info!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            conversation_id = %handle.conversation_id,
            "connection opened"
        );
        ConnectionSession {
            handle,
            outbound,
            cancel,
        }
    }

    /// Close a connection. Safe to call any number of times.
    ///
    /// Returns whether this call did the closing.
    pub fn on_disconnect(&self, handle: &ConnectionHandle) -> bool {
        match self.registry.remove(handle) {
            Some(channel) => {
                channel.close();
                info!(
                    connection_id = %handle.id,
                    conversation_id = %handle.conversation_id,
                    "connection closed"
                );
                true
            }
            None => false,
        }
    }

    /// Close every live connection.
    pub fn shutdown(&self) -> usize {
        self.registry.close_all()
    }

    // --- Messaging ---

    /// Persist a message from `handle` and broadcast it.
    ///
    /// On failure the submitter alone receives an error frame and nothing
    /// is broadcast. When a completion provider is configured, an assistant
    /// reply is produced in the background.
    pub async fn on_inbound_message(
        &self,
        handle: &ConnectionHandle,
        content: String,
    ) -> Result<Message, ChatError> {
        if self.registry.channel(handle).is_none() {
            return Err(ChatError::ConnectionSendFailed(
                "connection is not registered".to_string(),
            ));
        }

        let submission = NewMessage {
            conversation_id: handle.conversation_id.clone(),
            sender_id: handle.user_id.clone(),
            role: MessageRole::User,
            content,
        };
        let exclude = match self.echo {
            EchoPolicy::Include => None,
            EchoPolicy::Skip => Some(handle.id),
        };

        let message = match self.append_and_broadcast(submission, exclude).await {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    connection_id = %handle.id,
                    conversation_id = %handle.conversation_id,
                    error = %err,
                    "inbound message rejected"
                );
                self.report(handle, &err).await;
                return Err(err);
            }
        };

        if self.completion.is_some() {
            let dispatcher = self.clone();
            let handle = handle.clone();
            let trigger = message.clone();
            tokio::spawn(async move {
                dispatcher.reply(handle, trigger).await;
            });
        }

        Ok(message)
    }

    async fn append_and_broadcast(
        &self,
        submission: NewMessage,
        exclude: Option<ConnectionId>,
    ) -> Result<Message, ChatError> {
        let _order = self.order.lock(&submission.conversation_id).await;
        let message = self.service.append_message(submission).await?;
        self.broadcast(&message, exclude).await;
        Ok(message)
    }

    /// Produce, store and broadcast an assistant reply to `trigger`.
    async fn reply(&self, handle: ConnectionHandle, trigger: Message) {
        let Some(provider) = self.completion.as_ref() else {
            return;
        };
        let conversation_id = trigger.conversation_id.clone();

        let messages = match self
            .service
            .read_recent_messages(&conversation_id, self.context_messages)
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                self.report(&handle, &err).await;
                return;
            }
        };

        let context = ConversationContext {
            conversation_id: conversation_id.clone(),
            messages,
        };
        debug!(
            conversation_id = %conversation_id,
            provider = provider.name(),
            context_messages = context.messages.len(),
            "requesting assistant reply"
        );
        let content = match provider.generate(&context).await {
            Ok(content) => content,
            Err(err) => {
                let err = ChatError::CompletionFailed(err);
                warn!(conversation_id = %conversation_id, error = %err, "assistant reply failed");
                self.report(&handle, &err).await;
                return;
            }
        };

        let reply = NewMessage {
            conversation_id,
            sender_id: UserId::assistant(),
            role: MessageRole::Assistant,
            content,
        };
        if let Err(err) = self.append_and_broadcast(reply, None).await {
            warn!(error = %err, "assistant reply was not stored");
            self.report(&handle, &err).await;
        }
    }

    /// Push a frame to one connection, closing it if the push fails.
    pub async fn send_to(&self, handle: &ConnectionHandle, frame: ServerFrame) -> Result<(), ChatError> {
        let channel = self.registry.channel(handle).ok_or_else(|| {
            ChatError::ConnectionSendFailed("connection is not registered".to_string())
        })?;
        if let Err(err) = channel.send(frame, self.send_timeout).await {
            warn!(connection_id = %handle.id, error = %err, "send failed, closing connection");
            self.on_disconnect(handle);
            return Err(err);
        }
        Ok(())
    }

    async fn report(&self, handle: &ConnectionHandle, err: &ChatError) {
        let frame = ServerFrame::error(err.code(), err.to_string());
        // A failure here has already closed the connection.
        let _ = self.send_to(handle, frame).await;
    }

    /// Deliver `message` to every live connection of its conversation.
    ///
    /// Returns how many connections accepted it.
    pub async fn broadcast(&self, message: &Message, exclude: Option<ConnectionId>) -> usize {
        let targets: Vec<(ConnectionHandle, ConnectionChannel)> = self
            .registry
            .channels_for(&message.conversation_id)
            .into_iter()
            .filter(|(handle, _)| Some(handle.id) != exclude)
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let timeout = self.send_timeout;
        let mut sends = Vec::with_capacity(targets.len());
        for (handle, channel) in targets {
            let frame = ServerFrame::Message {
                message: message.clone(),
            };
            sends.push(async move {
                let result = channel.send(frame, timeout).await;
                (handle, result)
            });
        }

        let mut delivered = 0;
        for (handle, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        connection_id = %handle.id,
                        conversation_id = %handle.conversation_id,
                        error = %err,
                        "dropping unresponsive connection"
                    );
                    self.on_disconnect(&handle);
                }
            }
        }
        debug!(
            conversation_id = %message.conversation_id,
            sequence = message.sequence,
            delivered,
            "message broadcast"
        );
        delivered
    }
}
