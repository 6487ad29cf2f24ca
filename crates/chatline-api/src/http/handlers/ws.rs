//! WebSocket endpoint for real-time conversation delivery.
//!
//! `/ws/{user_id}/conversations/{conversation_id}` upgrades to a WebSocket
//! and registers the connection with the dispatcher. Each connection runs
//! two tasks:
//!
//! - **Writer:** drains the connection's outbound queue into the socket, in
//!   order, until the connection is cancelled or the socket fails. Each
//!   socket write is bounded by the send timeout and abandoned on cancel.
//! - **Reader:** turns inbound text frames into submissions or pongs, and
//!   enforces the idle timeout. Traffic in either direction counts as
//!   activity, so a listen-only client stays connected while it receives.
//!
//! Whichever side stops first cancels the other, and the connection is
//! always unregistered on the way out.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use chatline_core::realtime::ConnectionSession;
use chatline_types::connection::ConnectionHandle;
use chatline_types::frame::{ClientFrame, ServerFrame};
use chatline_types::ids::{ConversationId, UserId};

use crate::http::error::AppError;
use crate::state::{AppState, ConcreteDispatcher};

/// Upgrade an HTTP request to a conversation WebSocket.
///
/// Malformed ids are rejected with 400 before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((user_id, conversation_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let user_id = UserId::parse(user_id)?;
    let conversation_id = ConversationId::parse(conversation_id)?;
    Ok(ws
        .on_upgrade(move |socket| handle_ws_connection(socket, state, user_id, conversation_id))
        .into_response())
}

async fn handle_ws_connection(
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
    conversation_id: ConversationId,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let dispatcher = state.dispatcher.clone();
    let ConnectionSession {
        handle,
        outbound,
        cancel,
    } = dispatcher.on_connect(user_id, conversation_id);

    let send_timeout = state.config.realtime.send_timeout();
    let activity = Arc::new(Notify::new());
    let mut writer = tokio::spawn(forward_outbound(
        ws_sender,
        outbound,
        cancel.clone(),
        send_timeout,
        Arc::clone(&activity),
    ));

    let idle = state.config.realtime.idle_timeout();
    let idle_timer = tokio::time::sleep(idle);
    tokio::pin!(idle_timer);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = activity.notified() => {
                idle_timer.as_mut().reset(tokio::time::Instant::now() + idle);
            }

            _ = &mut idle_timer => {
                tracing::debug!(connection_id = %handle.id, "closing idle connection");
                break;
            }

            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(WsMessage::Text(text))) => {
                        idle_timer.as_mut().reset(tokio::time::Instant::now() + idle);
                        if !handle_text(&dispatcher, &handle, text.as_str()).await {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %handle.id, "WebSocket receive error: {err}");
                        break;
                    }
                    // Binary and protocol-level ping/pong still count as activity.
                    Some(Ok(_)) => {
                        idle_timer.as_mut().reset(tokio::time::Instant::now() + idle);
                    }
                }
            }
        }
    }

    dispatcher.on_disconnect(&handle);
    cancel.cancel();
    // The writer only has the close frame left to send, itself bounded by
    // the send timeout.
    match tokio::time::timeout(send_timeout * 2, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(connection_id = %handle.id, "WebSocket writer task failed: {err}");
        }
        Err(_) => {
            tracing::warn!(connection_id = %handle.id, "WebSocket writer stuck, aborting");
            writer.abort();
        }
    }
}

/// Handle one inbound text frame. Returns false when the connection is gone.
async fn handle_text(dispatcher: &ConcreteDispatcher, handle: &ConnectionHandle, text: &str) -> bool {
    match ClientFrame::from_text(text) {
        ClientFrame::Message { content } => {
            match dispatcher.on_inbound_message(handle, content).await {
                Ok(_) => true,
                // The submitter already got an error frame; only a missing
                // registration ends the connection.
                Err(err) => {
                    if dispatcher.registry().channel(handle).is_some() {
                        true
                    } else {
                        tracing::debug!(connection_id = %handle.id, "submission dropped: {err}");
                        false
                    }
                }
            }
        }
        ClientFrame::Ping => dispatcher.send_to(handle, ServerFrame::Pong).await.is_ok(),
    }
}

/// Write queued frames to the socket until cancelled.
///
/// A write that outlasts `send_timeout` closes the connection. Every
/// completed write is reported on `activity`.
async fn forward_outbound<S>(
    mut ws_sender: S,
    mut outbound: mpsc::Receiver<ServerFrame>,
    cancel: CancellationToken,
    send_timeout: Duration,
    activity: Arc<Notify>,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    let mut socket_ok = true;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!("Failed to serialize ServerFrame: {err}");
                        continue;
                    }
                };
                let write = tokio::time::timeout(send_timeout, ws_sender.send(WsMessage::Text(json.into())));
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = write => Some(result),
                };
                match written {
                    Some(Ok(Ok(()))) => activity.notify_one(),
                    Some(Ok(Err(err))) => {
                        tracing::debug!("WebSocket send failed: {err}");
                        socket_ok = false;
                        cancel.cancel();
                        break;
                    }
                    Some(Err(_)) => {
                        tracing::debug!("WebSocket send timed out, closing");
                        socket_ok = false;
                        cancel.cancel();
                        break;
                    }
                    // Cancelled mid-write; the socket is in an unknown state.
                    None => {
                        socket_ok = false;
                        break;
                    }
                }
            }
        }
    }

    if socket_ok {
        let _ = tokio::time::timeout(send_timeout, ws_sender.send(WsMessage::Close(None))).await;
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::state::test_support::test_state;

    fn ids() -> (UserId, ConversationId) {
        (UserId::parse("alice").unwrap(), ConversationId::parse("ws-conv").unwrap())
    }

    #[tokio::test]
    async fn text_frame_is_stored_and_echoed() {
        let state = test_state().await;
        let (user, conv) = ids();
        let mut session = state.dispatcher.on_connect(user, conv.clone());

        assert!(handle_text(&state.dispatcher, &session.handle, "hello").await);

        match session.outbound.recv().await.unwrap() {
            ServerFrame::Message { message } => {
                assert_eq!(message.content, "hello");
                assert_eq!(message.sequence, 1);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        let stored = state.conversations().read_recent_messages(&conv, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn ping_frame_gets_pong() {
        let state = test_state().await;
        let (user, conv) = ids();
        let mut session = state.dispatcher.on_connect(user, conv);

        assert!(handle_text(&state.dispatcher, &session.handle, r#"{"type":"ping"}"#).await);
        assert_eq!(session.outbound.recv().await.unwrap(), ServerFrame::Pong);
    }

    #[tokio::test]
    async fn invalid_message_keeps_connection_open() {
        let state = test_state().await;
        let (user, conv) = ids();
        let mut session = state.dispatcher.on_connect(user, conv);

        assert!(handle_text(&state.dispatcher, &session.handle, "   ").await);
        match session.outbound.recv().await.unwrap() {
            ServerFrame::Error { code, .. } => assert_eq!(code, "INVALID_MESSAGE"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    type Sent = mpsc::UnboundedReceiver<WsMessage>;

    /// A sink that records every message written to it.
    fn recording_sink() -> (impl Sink<WsMessage, Error = Infallible> + Unpin, Sent) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(tx, |tx, msg: WsMessage| async move {
            let _ = tx.send(msg);
            Ok::<_, Infallible>(tx)
        });
        (Box::pin(sink), rx)
    }

    /// A sink whose writes never complete, like a client that stopped reading.
    fn stalled_sink() -> impl Sink<WsMessage, Error = Infallible> + Unpin {
        Box::pin(futures_util::sink::unfold((), |(), _msg: WsMessage| {
            std::future::pending::<Result<(), Infallible>>()
        }))
    }

    #[tokio::test]
    async fn writer_sends_frames_and_reports_activity() {
        let (sink, mut sent) = recording_sink();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let activity = Arc::new(Notify::new());
        let writer = tokio::spawn(forward_outbound(
            sink,
            rx,
            cancel.clone(),
            Duration::from_secs(1),
            Arc::clone(&activity),
        ));

        tx.send(ServerFrame::Pong).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), activity.notified())
            .await
            .unwrap();
        match sent.recv().await.unwrap() {
            WsMessage::Text(text) => assert_eq!(text.as_str(), r#"{"type":"pong"}"#),
            other => panic!("unexpected message: {other:?}"),
        }

        cancel.cancel();
        writer.await.unwrap();
        assert!(matches!(sent.recv().await.unwrap(), WsMessage::Close(None)));
    }

    #[tokio::test]
    async fn stalled_write_times_out_and_cancels() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let writer = tokio::spawn(forward_outbound(
            stalled_sink(),
            rx,
            cancel.clone(),
            Duration::from_millis(30),
            Arc::new(Notify::new()),
        ));

        tx.send(ServerFrame::Pong).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer should give up on a stalled socket")
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_interrupts_stalled_write() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let writer = tokio::spawn(forward_outbound(
            stalled_sink(),
            rx,
            cancel.clone(),
            Duration::from_secs(60),
            Arc::new(Notify::new()),
        ));

        tx.send(ServerFrame::Pong).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer should stop once cancelled")
            .unwrap();
    }

    #[tokio::test]
    async fn disconnected_handle_ends_loop() {
        let state = test_state().await;
        let (user, conv) = ids();
        let session = state.dispatcher.on_connect(user, conv);
        state.dispatcher.on_disconnect(&session.handle);

        assert!(!handle_text(&state.dispatcher, &session.handle, "late").await);
        assert!(session.cancel.is_cancelled());
    }
}
