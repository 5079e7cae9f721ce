use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval, sleep};

use crate::auth::Identity;
use crate::state::AppState;
use crate::ws::{CLOSE_SETUP_FAILED, ChannelType, protocol, router};

/// Transport ping cadence. Catches abrupt disconnects long before the
/// reaper's idle timeout would.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A ping left unanswered for this long means the peer is gone.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one authenticated WebSocket to completion.
///
/// The socket is split: a spawned writer task owns the sink and drains an
/// mpsc channel, so any component holding a clone of the sender can push
/// frames to this client. The read loop below multiplexes inbound frames
/// with the ping timer and the pong deadline via `select!`.
///
/// Registration evicts any prior connection for the same (channel, user)
/// key; the offline queue is flushed before the read loop accepts inbound
/// traffic so buffered messages are delivered ahead of new work.
pub async fn run_connection(
    socket: WebSocket,
    state: AppState,
    channel: ChannelType,
    identity: Identity,
) {
    let user_id = identity.user_id;
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(drain_to_sink(sink, rx));

    // Handshake completion marker, observed by clients before any queued
    // traffic arrives.
    let greeting = protocol::envelope(
        channel,
        "connected",
        json!({ "channel": channel.as_str(), "user_id": user_id }),
    );

    // Registration feeds the greeting and the offline backlog while the
    // registry entry is exclusively held, so a concurrent live delivery for
    // this key cannot land ahead of the flushed queue.
    let accepted = state
        .registry
        .register(channel, &user_id, identity.role, tx.clone(), || {
            let mut frames = vec![protocol::to_message(&greeting)];
            let queued = state.offline.flush(channel, &user_id);
            if !queued.is_empty() {
                tracing::info!(
                    channel = %channel,
                    user_id = %user_id,
                    count = queued.len(),
                    "Flushing offline queue"
                );
                frames.extend(queued.iter().map(|entry| protocol::to_message(&entry.payload)));
            }
            frames
        });
    if !accepted {
        // Writer died before setup completed; the close is best-effort.
        tracing::warn!(channel = %channel, user_id = %user_id, "Connection setup failed");
        let _ = tx.send(Message::Close(Some(CloseFrame {
            code: CLOSE_SETUP_FAILED,
            reason: "Connection setup failed".into(),
        })));
        state.registry.unregister_handle(channel, &user_id, &tx);
        writer.abort();
        return;
    }

    // Handler-provided connect push (e.g. unread_count on notifications).
    if let Some(handler) = state.handlers.for_channel(channel) {
        for resp in handler.on_connect(&user_id).await {
            let frame = protocol::envelope(channel, &resp.msg_type, resp.data);
            let _ = tx.send(protocol::to_message(&frame));
        }
    }

    tracing::info!(channel = %channel, user_id = %user_id, "WebSocket actor started");

    let mut ping_timer = interval(PING_INTERVAL);
    ping_timer.tick().await; // discard the immediate first tick

    // Armed when a ping goes out, disarmed by the matching pong.
    let pong_deadline = sleep(Duration::ZERO);
    tokio::pin!(pong_deadline);
    let mut pong_pending = false;

    // Inbound frames from one connection are dispatched in receipt order;
    // dispatch is awaited inline so this connection's stream never reorders,
    // while other connections run in their own tasks.
    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    router::dispatch(&state, channel, &user_id, &tx, &text).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    // The protocol is JSON text frames.
                    tracing::debug!(
                        channel = %channel,
                        user_id = %user_id,
                        "Ignoring binary frame on a text protocol"
                    );
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = tx.send(Message::Pong(payload));
                }
                Some(Ok(Message::Pong(_))) => {
                    pong_pending = false;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        channel = %channel,
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        channel = %channel,
                        user_id = %user_id,
                        error = %err,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    tracing::info!(channel = %channel, user_id = %user_id, "WebSocket stream ended");
                    break;
                }
            },

            _ = ping_timer.tick() => {
                if tx.send(Message::Ping(Vec::new().into())).is_err() {
                    break; // writer gone, nothing left to drive
                }
                if !pong_pending {
                    pong_pending = true;
                    pong_deadline.as_mut().reset(Instant::now() + PONG_TIMEOUT);
                }
            }

            _ = &mut pong_deadline, if pong_pending => {
                tracing::warn!(
                    channel = %channel,
                    user_id = %user_id,
                    "Pong deadline missed, dropping connection"
                );
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }

    // A handler call already dispatched keeps running to completion on its
    // own; only this connection's read loop stops here.
    writer.abort();

    let message_count = state.registry.message_count(channel, &user_id);
    // Remove our entry only — a replacement connection may already own the key.
    state.registry.unregister_handle(channel, &user_id, &tx);

    tracing::info!(
        channel = %channel,
        user_id = %user_id,
        message_count,
        "WebSocket actor stopped"
    );
}

/// Forward frames from the connection's mpsc channel into the socket sink.
/// Exits when every sender is dropped or the transport rejects a write.
async fn drain_to_sink(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(frame) = rx.recv().await {
        if sink.send(frame).await.is_err() {
            break;
        }
    }
}
