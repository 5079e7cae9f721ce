//! Source of truth for live connections.
//!
//! Maps `(channel_type, user_id)` to the connection's sender handle plus
//! liveness metadata. At most one connection exists per key at any instant:
//! registering a new one closes and evicts the prior entry. Cross-component
//! references are by identity key, never by pointer, so nothing dangles
//! after an eviction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::auth::Role;
use crate::error::DeliveryError;
use crate::ws::{CLOSE_REPLACED, ChannelType, ConnectionSender};

/// One live socket bound to an identity and a channel-type.
pub struct ConnectionEntry {
    pub tx: ConnectionSender,
    pub role: Role,
    pub connected_at: DateTime<Utc>,
    /// Monotonic; updated on every inbound or outbound transfer.
    pub last_activity: Instant,
    /// Inbound frames dispatched on this connection.
    pub message_count: u64,
}

pub struct ConnectionRegistry {
    connections: DashMap<(ChannelType, String), ConnectionEntry>,
    total_registered: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            total_registered: AtomicU64::new(0),
        }
    }

    /// Register a connection, evicting any prior entry for the same key.
    /// The evicted connection is sent a close frame best-effort.
    ///
    /// `backlog` produces the frames that must reach this connection before
    /// any live traffic (greeting, offline flush). It runs while the map
    /// entry is exclusively held, so a concurrent `send_to` for the same key
    /// blocks until the backlog is in the writer queue and cannot overtake
    /// it. The closure must not call back into the registry.
    ///
    /// Returns whether every backlog frame was accepted by the writer; a
    /// rejection means the connection died during setup.
    pub fn register(
        &self,
        channel: ChannelType,
        user_id: &str,
        role: Role,
        tx: ConnectionSender,
        backlog: impl FnOnce() -> Vec<Message>,
    ) -> bool {
        let entry = ConnectionEntry {
            tx,
            role,
            connected_at: Utc::now(),
            last_activity: Instant::now(),
            message_count: 0,
        };

        let (prior, held) = match self.connections.entry((channel, user_id.to_string())) {
            Entry::Occupied(mut occupied) => {
                let old = occupied.insert(entry);
                (Some(old), occupied.into_ref())
            }
            Entry::Vacant(vacant) => (None, vacant.insert(entry)),
        };
        self.total_registered.fetch_add(1, Ordering::Relaxed);

        if let Some(old) = prior {
            let _ = old.tx.send(Message::Close(Some(CloseFrame {
                code: CLOSE_REPLACED,
                reason: "Replaced by new connection".into(),
            })));
            tracing::info!(
                channel = %channel,
                user_id,
                "Evicted prior connection for the same identity"
            );
        }

        let mut accepted = true;
        for frame in backlog() {
            if held.tx.send(frame).is_err() {
                accepted = false;
                break;
            }
        }
        drop(held);

        tracing::debug!(
            channel = %channel,
            user_id,
            active = self.connections.len(),
            "Connection registered"
        );
        accepted
    }

    /// Idempotent removal; no-op if absent.
    pub fn unregister(&self, channel: ChannelType, user_id: &str) {
        if self
            .connections
            .remove(&(channel, user_id.to_string()))
            .is_some()
        {
            tracing::debug!(channel = %channel, user_id, "Connection unregistered");
        }
    }

    /// Remove the entry only if it still belongs to `tx`. Used by an actor's
    /// cleanup path so a replaced connection never removes its successor.
    pub fn unregister_handle(&self, channel: ChannelType, user_id: &str, tx: &ConnectionSender) {
        self.connections
            .remove_if(&(channel, user_id.to_string()), |_, entry| {
                entry.tx.same_channel(tx)
            });
    }

    /// Update `last_activity`; called on every successful transfer.
    pub fn touch(&self, channel: ChannelType, user_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(&(channel, user_id.to_string())) {
            entry.last_activity = Instant::now();
        }
    }

    /// Touch plus inbound message accounting.
    pub fn record_inbound(&self, channel: ChannelType, user_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(&(channel, user_id.to_string())) {
            entry.last_activity = Instant::now();
            entry.message_count += 1;
        }
    }

    pub fn lookup_sender(&self, channel: ChannelType, user_id: &str) -> Option<ConnectionSender> {
        self.connections
            .get(&(channel, user_id.to_string()))
            .map(|entry| entry.tx.clone())
    }

    pub fn message_count(&self, channel: ChannelType, user_id: &str) -> u64 {
        self.connections
            .get(&(channel, user_id.to_string()))
            .map(|entry| entry.message_count)
            .unwrap_or(0)
    }

    /// User ids with a live connection on `channel`.
    pub fn list(&self, channel: ChannelType) -> Vec<String> {
        self.connections
            .iter()
            .filter(|entry| entry.key().0 == channel)
            .map(|entry| entry.key().1.clone())
            .collect()
    }

    pub fn channel_count(&self, channel: ChannelType) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.key().0 == channel)
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Total connections ever registered.
    pub fn total_registered(&self) -> u64 {
        self.total_registered.load(Ordering::Relaxed)
    }

    /// Send a frame to a live connection. A failed send means the writer
    /// task is gone: the entry is evicted and the failure reported.
    pub fn send_to(
        &self,
        channel: ChannelType,
        user_id: &str,
        msg: Message,
    ) -> Result<(), DeliveryError> {
        let dead = DeliveryError {
            channel,
            user_id: user_id.to_string(),
        };
        let Some(tx) = self.lookup_sender(channel, user_id) else {
            return Err(dead);
        };
        if tx.send(msg).is_err() {
            self.unregister(channel, user_id);
            return Err(dead);
        }
        self.touch(channel, user_id);
        Ok(())
    }

    /// Evict every connection idle longer than `timeout`, closing the handle.
    /// Returns the evicted keys. Only the reaper may evict purely for
    /// inactivity.
    pub fn sweep_idle(&self, timeout: Duration) -> Vec<(ChannelType, String)> {
        let now = Instant::now();
        // Collect first; removing while iterating would contend on the shard.
        let stale: Vec<(ChannelType, String)> = self
            .connections
            .iter()
            .filter(|entry| now.duration_since(entry.value().last_activity) > timeout)
            .map(|entry| entry.key().clone())
            .collect();

        for key in &stale {
            if let Some((_, entry)) = self.connections.remove(key) {
                let _ = entry.tx.send(Message::Close(Some(CloseFrame {
                    code: crate::ws::CLOSE_IDLE_TIMEOUT,
                    reason: "Idle timeout".into(),
                })));
            }
        }
        stale
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
