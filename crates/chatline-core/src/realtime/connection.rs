//! Per-connection outbound channel and lifecycle.
//!
//! Every live connection owns a bounded FIFO queue of [`ServerFrame`]s.
//! The dispatcher pushes into it with a send timeout; the transport task
//! (the WebSocket loop) drains it. Closing a connection cancels its token,
//! which stops only that connection's loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatline_types::connection::{ConnectionHandle, ConnectionState, TransitionError};
use chatline_types::error::ChatError;
use chatline_types::frame::ServerFrame;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;

/// Guarded connection state machine.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: Mutex<ConnectionState>,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connecting),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&self, next: ConnectionState) -> Result<(), TransitionError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !state.can_transition_to(next) {
            return Err(TransitionError {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side of a connection, held by the registry.
#[derive(Debug, Clone)]
pub struct ConnectionChannel {
    sender: mpsc::Sender<ServerFrame>,
    cancel: CancellationToken,
    lifecycle: Arc<ConnectionLifecycle>,
}

impl ConnectionChannel {
    /// Create a channel in the `Connecting` state together with the
    /// receiving end of its outbound queue.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let channel = Self {
            sender,
            cancel: CancellationToken::new(),
            lifecycle: Arc::new(ConnectionLifecycle::new()),
        };
        (channel, receiver)
    }

    /// Queue a frame, waiting at most `timeout` for room.
    pub async fn send(&self, frame: ServerFrame, timeout: Duration) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::ConnectionSendFailed("connection is closed".to_string()));
        }
        self.sender
            .send_timeout(frame, timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => ChatError::ConnectionSendFailed(format!(
                    "outbound queue full for {}ms",
                    timeout.as_millis()
                )),
                SendTimeoutError::Closed(_) => {
                    ChatError::ConnectionSendFailed("receiver dropped".to_string())
                }
            })
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &ConnectionLifecycle {
        &self.lifecycle
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walk the connection to `Closed` and cancel its loop.
    ///
    /// Returns `false` if the connection was already closing or closed.
    pub fn close(&self) -> bool {
        if self.lifecycle.transition(ConnectionState::Closing).is_err() {
            return false;
        }
        self.cancel.cancel();
        // Closing -> Closed is always permitted once Closing was reached here.
        let _ = self.lifecycle.transition(ConnectionState::Closed);
        true
    }
}

/// What the transport task gets back from a connect.
#[derive(Debug)]
pub struct ConnectionSession {
    pub handle: ConnectionHandle,
    /// Frames to write to the client, in broadcast order.
    pub outbound: mpsc::Receiver<ServerFrame>,
    /// Cancelled when the connection is closed from the server side.
    pub cancel: CancellationToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_rejects_backwards_moves() {
        let lifecycle = ConnectionLifecycle::new();
        lifecycle.transition(ConnectionState::Open).unwrap();
        let err = lifecycle.transition(ConnectionState::Connecting).unwrap_err();
        assert_eq!(err.from, ConnectionState::Open);
        assert_eq!(lifecycle.state(), ConnectionState::Open);
    }

    #[test]
    fn close_runs_once() {
        let (channel, _rx) = ConnectionChannel::new(4);
        channel.lifecycle().transition(ConnectionState::Open).unwrap();

        assert!(channel.close());
        assert!(!channel.close());
        assert_eq!(channel.state(), ConnectionState::Closed);
        assert!(channel.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn send_times_out_when_queue_full() {
        let (channel, _rx) = ConnectionChannel::new(1);
        channel
            .send(ServerFrame::Pong, Duration::from_millis(10))
            .await
            .unwrap();
        let err = channel
            .send(ServerFrame::Pong, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ConnectionSendFailed(_)));
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (channel, rx) = ConnectionChannel::new(4);
        drop(rx);
        assert!(
            channel
                .send(ServerFrame::Pong, Duration::from_millis(10))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (channel, mut rx) = ConnectionChannel::new(4);
        channel
            .send(ServerFrame::error("A", "first"), Duration::from_millis(10))
            .await
            .unwrap();
        channel
            .send(ServerFrame::Pong, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(ServerFrame::error("A", "first")));
        assert_eq!(rx.recv().await, Some(ServerFrame::Pong));
    }
}
