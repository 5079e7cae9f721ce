//! Background sweep disconnecting idle connections.
//!
//! The only component permitted to evict a connection purely for
//! inactivity; everything else evicts on explicit disconnect, transport
//! error, or replacement.

use std::sync::Arc;
use std::time::Duration;

use crate::ws::registry::ConnectionRegistry;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Spawn the periodic reaper task.
pub fn spawn(
    registry: Arc<ConnectionRegistry>,
    sweep_interval: Duration,
    idle_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // skip the immediate tick
        loop {
            ticker.tick().await;
            let evicted = registry.sweep_idle(idle_timeout);
            for (channel, user_id) in &evicted {
                tracing::info!(channel = %channel, user_id, "Reaped idle connection");
            }
        }
    })
}
