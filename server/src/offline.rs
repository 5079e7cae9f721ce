//! Bounded per-recipient FIFO buffering for outbound frames when no live
//! connection exists. Purely in-memory; durability is a non-goal. Each
//! recipient's queue is a ring: insertion past capacity evicts the oldest
//! entry. The whole buffer for a recipient is drained atomically, in FIFO
//! order, the moment they reconnect on the matching channel.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::ws::ChannelType;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// An outbound payload waiting for its recipient to reconnect.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
}

pub struct OfflineQueue {
    queues: DashMap<(ChannelType, String), VecDeque<QueuedMessage>>,
    capacity: usize,
}

impl OfflineQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Append `payload` to the recipient's buffer, evicting the oldest entry
    /// first when at capacity.
    pub fn enqueue(&self, channel: ChannelType, recipient_id: &str, payload: Value) {
        let mut queue = self
            .queues
            .entry((channel, recipient_id.to_string()))
            .or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
            tracing::debug!(
                channel = %channel,
                recipient_id,
                "Offline queue at capacity, dropped oldest entry"
            );
        }
        queue.push_back(QueuedMessage {
            payload,
            enqueued_at: Utc::now(),
        });
    }

    /// Atomically drain and return all buffered payloads for the recipient,
    /// in enqueue order. The recipient's buffer entry is deleted.
    pub fn flush(&self, channel: ChannelType, recipient_id: &str) -> Vec<QueuedMessage> {
        match self.queues.remove(&(channel, recipient_id.to_string())) {
            Some((_, queue)) => queue.into(),
            None => Vec::new(),
        }
    }

    /// Buffered entries for one recipient, without draining.
    pub fn depth(&self, channel: ChannelType, recipient_id: &str) -> usize {
        self.queues
            .get(&(channel, recipient_id.to_string()))
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Total buffered entries across all recipients.
    pub fn total_queued(&self) -> usize {
        self.queues.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flush_returns_fifo_order_and_drains() {
        let q = OfflineQueue::new(10);
        q.enqueue(ChannelType::Notifications, "alice", json!({"n": 1}));
        q.enqueue(ChannelType::Notifications, "alice", json!({"n": 2}));
        q.enqueue(ChannelType::Notifications, "alice", json!({"n": 3}));

        let flushed = q.flush(ChannelType::Notifications, "alice");
        let ns: Vec<i64> = flushed.iter().map(|m| m.payload["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3]);

        // Second flush finds nothing — delivery is exactly once.
        assert!(q.flush(ChannelType::Notifications, "alice").is_empty());
        assert_eq!(q.total_queued(), 0);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let q = OfflineQueue::new(3);
        for n in 1..=5 {
            q.enqueue(ChannelType::Chat, "bob", json!({"n": n}));
        }
        assert_eq!(q.depth(ChannelType::Chat, "bob"), 3);

        let flushed = q.flush(ChannelType::Chat, "bob");
        let ns: Vec<i64> = flushed.iter().map(|m| m.payload["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![3, 4, 5]);
    }

    #[test]
    fn recipients_and_channels_are_isolated() {
        let q = OfflineQueue::new(10);
        q.enqueue(ChannelType::Chat, "alice", json!({"from": "chat"}));
        q.enqueue(ChannelType::Notifications, "alice", json!({"from": "notif"}));
        q.enqueue(ChannelType::Chat, "bob", json!({"from": "bob"}));

        assert_eq!(q.flush(ChannelType::Chat, "alice").len(), 1);
        assert_eq!(q.depth(ChannelType::Notifications, "alice"), 1);
        assert_eq!(q.depth(ChannelType::Chat, "bob"), 1);
    }
}
