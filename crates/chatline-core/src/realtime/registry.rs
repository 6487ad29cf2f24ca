//! Live connection registry.
//!
//! Connections are grouped by conversation in a sharded concurrent map, so
//! register, unregister and broadcast lookups for one conversation are
//! linearizable and never contend with other conversations' shards.

use std::collections::HashMap;

use chatline_types::connection::{ConnectionHandle, ConnectionId};
use chatline_types::ids::{ConversationId, UserId};
use dashmap::DashMap;
use tracing::{debug, info};

use super::connection::ConnectionChannel;

/// Registry of live connections keyed by conversation.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conversations: DashMap<ConversationId, HashMap<ConnectionId, Registered>>,
}

#[derive(Debug, Clone)]
struct Registered {
    handle: ConnectionHandle,
    channel: ConnectionChannel,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Each call creates a new, independently removable
    /// handle, even for a `(user, conversation)` pair that is already
    /// connected.
    pub fn register(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        channel: ConnectionChannel,
    ) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: ConnectionId::new(),
            user_id,
            conversation_id,
        };
        self.conversations
            .entry(handle.conversation_id.clone())
            .or_default()
            .insert(
                handle.id,
                Registered {
                    handle: handle.clone(),
                    channel,
                },
            );
        debug!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            conversation_id = %handle.conversation_id,
            "connection registered"
        );
        handle
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub fn unregister(&self, handle: &ConnectionHandle) -> bool {
        self.remove(handle).is_some()
    }

    /// Remove a connection and hand back its channel.
    pub fn remove(&self, handle: &ConnectionHandle) -> Option<ConnectionChannel> {
        let removed = self
            .conversations
            .get_mut(&handle.conversation_id)
            .and_then(|mut connections| connections.remove(&handle.id));
        // Emptiness is re-checked under the shard lock, so a concurrent
        // register for this conversation is never dropped.
        self.conversations
            .remove_if(&handle.conversation_id, |_, connections| connections.is_empty());
        removed.map(|registered| registered.channel)
    }

    /// Handles of every live connection in a conversation.
    pub fn connections_for(&self, conversation_id: &ConversationId) -> Vec<ConnectionHandle> {
        self.conversations
            .get(conversation_id)
            .map(|connections| {
                connections
                    .values()
                    .map(|registered| registered.handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Handles and channels of every live connection in a conversation.
    pub fn channels_for(
        &self,
        conversation_id: &ConversationId,
    ) -> Vec<(ConnectionHandle, ConnectionChannel)> {
        self.conversations
            .get(conversation_id)
            .map(|connections| {
                connections
                    .values()
                    .map(|registered| (registered.handle.clone(), registered.channel.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn channel(&self, handle: &ConnectionHandle) -> Option<ConnectionChannel> {
        self.conversations
            .get(&handle.conversation_id)
            .and_then(|connections| {
                connections
                    .get(&handle.id)
                    .map(|registered| registered.channel.clone())
            })
    }

    pub fn connection_count(&self) -> usize {
        self.conversations
            .iter()
            .map(|connections| connections.len())
            .sum()
    }

    /// Number of conversations with at least one live connection.
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Remove and close every connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let conversation_ids: Vec<ConversationId> = self
            .conversations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for conversation_id in conversation_ids {
            if let Some((_, connections)) = self.conversations.remove(&conversation_id) {
                for registered in connections.into_values() {
                    if registered.channel.close() {
                        closed += 1;
                    }
                }
            }
        }
        info!(closed, "closed all connections");
        closed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chatline_types::connection::ConnectionState;

    use super::*;

    fn ids(user: &str, conversation: &str) -> (UserId, ConversationId) {
        (
            UserId::parse(user).unwrap(),
            ConversationId::parse(conversation).unwrap(),
        )
    }

    fn channel() -> ConnectionChannel {
        ConnectionChannel::new(4).0
    }

    #[test]
    fn same_user_may_hold_several_connections() {
        let registry = ConnectionRegistry::new();
        let (user, conversation) = ids("alice", "c1");
        let a = registry.register(user.clone(), conversation.clone(), channel());
        let b = registry.register(user, conversation.clone(), channel());

        assert_ne!(a.id, b.id);
        assert_eq!(registry.connections_for(&conversation).len(), 2);

        assert!(registry.unregister(&a));
        assert_eq!(registry.connections_for(&conversation), vec![b]);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (user, conversation) = ids("alice", "c1");
        let handle = registry.register(user, conversation, channel());

        assert!(registry.unregister(&handle));
        assert!(!registry.unregister(&handle));
        assert_eq!(registry.conversation_count(), 0);
    }

    #[test]
    fn lookups_are_scoped_to_conversation() {
        let registry = ConnectionRegistry::new();
        let (alice, c1) = ids("alice", "c1");
        let (bob, c2) = ids("bob", "c2");
        registry.register(alice, c1.clone(), channel());
        registry.register(bob, c2.clone(), channel());

        assert_eq!(registry.connections_for(&c1).len(), 1);
        assert_eq!(registry.connections_for(&c2).len(), 1);
        assert_eq!(registry.conversation_count(), 2);
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn close_all_closes_every_channel() {
        let registry = ConnectionRegistry::new();
        let (alice, c1) = ids("alice", "c1");
        let open = channel();
        open.lifecycle().transition(ConnectionState::Open).unwrap();
        registry.register(alice.clone(), c1.clone(), open.clone());
        registry.register(alice, c1, channel());

        assert_eq!(registry.close_all(), 2);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(open.state(), ConnectionState::Closed);
        assert!(open.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn concurrent_register_and_unregister_keep_exact_set() {
        let registry = Arc::new(ConnectionRegistry::new());
        let conversation = ConversationId::parse("busy").unwrap();

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let registry = Arc::clone(&registry);
            let conversation = conversation.clone();
            tasks.push(tokio::spawn(async move {
                let user = UserId::parse(format!("user-{worker}")).unwrap();
                let mut kept = Vec::new();
                for i in 0..50 {
                    let handle =
                        registry.register(user.clone(), conversation.clone(), channel());
                    // Interleave lookups with writes.
                    assert!(!registry.connections_for(&conversation).is_empty());
                    if i % 2 == 0 {
                        assert!(registry.unregister(&handle));
                    } else {
                        kept.push(handle);
                    }
                    tokio::task::yield_now().await;
                }
                kept
            }));
        }

        let mut expected = HashSet::new();
        for task in tasks {
            expected.extend(task.await.unwrap().into_iter().map(|handle| handle.id));
        }

        let actual: Vec<ConnectionId> = registry
            .connections_for(&conversation)
            .into_iter()
            .map(|handle| handle.id)
            .collect();
        assert_eq!(actual.len(), 200);
        assert_eq!(actual.into_iter().collect::<HashSet<_>>(), expected);
    }
}
