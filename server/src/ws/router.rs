//! Inbound frame routing: validate, gate through the rate limiter, dispatch.
//!
//! Field-level validation failures and throttling produce in-band error
//! frames; they never close the connection. Handler failures are surfaced as
//! a generic error frame — internal detail is logged, not sent.

use serde_json::{Value, json};

use crate::error::HandlerError;
use crate::limiter::Admission;
use crate::state::AppState;
use crate::ws::protocol::{BroadcastTarget, Request};
use crate::ws::{ChannelType, ConnectionSender, broadcast, protocol};

/// Process one raw inbound frame from `user_id`'s connection on `channel`.
pub async fn dispatch(
    state: &AppState,
    channel: ChannelType,
    user_id: &str,
    tx: &ConnectionSender,
    raw: &str,
) {
    let request = match protocol::parse(channel, raw) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(
                channel = %channel,
                user_id,
                error = %err,
                "Rejected invalid frame"
            );
            send(state, channel, user_id, tx, &protocol::validation_error(channel, &err));
            return;
        }
    };

    // Heartbeats occupy a limiter slot like any other message.
    if let Admission::Limited { retry_after } = state.limiter.admit(user_id) {
        send(state, channel, user_id, tx, &protocol::rate_limited(channel, retry_after));
        return;
    }

    state.registry.record_inbound(channel, user_id);

    let frame = match request {
        Request::Heartbeat => protocol::heartbeat_ack(channel),
        Request::GetStats => protocol::envelope(channel, "stats", stats_payload(state)),
        Request::BroadcastAnnouncement {
            announcement,
            target,
        } => {
            let delivered = fan_out_announcement(state, user_id, &announcement, target);
            protocol::envelope(channel, "announcement_sent", json!({ "delivered": delivered }))
        }
        other => {
            let Some(handler) = state.handlers.for_channel(channel) else {
                // Unreachable given the parse tables; answer rather than drop.
                send(
                    state,
                    channel,
                    user_id,
                    tx,
                    &protocol::error_frame(channel, "internal_error", "Internal server error"),
                );
                return;
            };
            match handler.handle(user_id, other).await {
                Ok(resp) => protocol::envelope(channel, &resp.msg_type, resp.data),
                Err(HandlerError::Rejected(reason)) => {
                    protocol::error_frame(channel, "operation_failed", &reason)
                }
                Err(HandlerError::Internal(detail)) => {
                    tracing::error!(
                        channel = %channel,
                        user_id,
                        detail,
                        "Handler failure"
                    );
                    protocol::error_frame(channel, "internal_error", "Internal server error")
                }
            }
        }
    };

    send(state, channel, user_id, tx, &frame);
}

/// Push a frame to this connection's writer and account the outbound
/// transfer. A failed push means the writer is gone; the read loop will
/// observe the disconnect on its own.
fn send(state: &AppState, channel: ChannelType, user_id: &str, tx: &ConnectionSender, frame: &Value) {
    if tx.send(protocol::to_message(frame)).is_ok() {
        state.registry.touch(channel, user_id);
    }
}

fn fan_out_announcement(
    state: &AppState,
    sender_id: &str,
    announcement: &str,
    target: BroadcastTarget,
) -> usize {
    let targets: Vec<ChannelType> = match target {
        BroadcastTarget::All => ChannelType::ALL.to_vec(),
        BroadcastTarget::Channel(channel) => vec![channel],
    };

    let exclude_sender = [sender_id.to_string()];
    let mut delivered = 0;
    for channel in targets {
        let frame = protocol::broadcast_frame(
            channel,
            "announcement",
            json!({ "announcement": announcement }),
        );
        // The announcing admin does not need an echo on their own channel.
        let exclude: &[String] = if channel == ChannelType::Admin {
            &exclude_sender
        } else {
            &[]
        };
        delivered += broadcast::broadcast(&state.registry, channel, &frame, exclude);
    }

    tracing::info!(sender_id, delivered, "Announcement broadcast");
    delivered
}

fn stats_payload(state: &AppState) -> Value {
    let mut connections = serde_json::Map::new();
    for channel in ChannelType::ALL {
        connections.insert(
            channel.as_str().to_string(),
            json!(state.registry.channel_count(channel)),
        );
    }
    json!({
        "connections": connections,
        "active_total": state.registry.active_count(),
        "total_registered": state.registry.total_registered(),
        "queued_messages": state.offline.total_queued(),
        "rate_tracked_identities": state.limiter.identity_count(),
        "uptime_secs": (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
