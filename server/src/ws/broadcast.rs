//! Fan-out delivery to every connection of a channel-type.
//!
//! Best-effort and unordered across recipients. A failed send evicts that
//! recipient's registry entry and the fan-out continues; no retry.

use serde_json::Value;

use crate::ws::protocol;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::ChannelType;

/// Send `frame` to every connection on `channel` except those in `exclude`.
/// Returns the number of recipients the frame was handed to.
pub fn broadcast(
    registry: &ConnectionRegistry,
    channel: ChannelType,
    frame: &Value,
    exclude: &[String],
) -> usize {
    let msg = protocol::to_message(frame);
    let mut delivered = 0;

    for user_id in registry.list(channel) {
        if exclude.iter().any(|ex| ex == &user_id) {
            continue;
        }
        match registry.send_to(channel, &user_id, msg.clone()) {
            Ok(()) => delivered += 1,
            Err(err) => {
                // send_to already evicted the dead entry; keep going.
                tracing::warn!(
                    channel = %channel,
                    user_id = %err.user_id,
                    "Dropped unreachable recipient from broadcast"
                );
            }
        }
    }

    delivered
}
