use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::handlers::HandlerSet;
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::offline::OfflineQueue;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::{ChannelType, protocol};

/// Shared application state passed to all handlers via axum State extractor.
///
/// Explicitly constructed and injected — never ambient — so tests can run
/// multiple isolated instances. Registry, limiter and offline queue are
/// guarded independently; there is no lock spanning all three.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub offline: Arc<OfflineQueue>,
    pub handlers: Arc<HandlerSet>,
    /// JWT verification secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        jwt_secret: Vec<u8>,
        limits: RateLimitConfig,
        offline_capacity: usize,
        handlers: HandlerSet,
    ) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            limiter: Arc::new(RateLimiter::new(limits)),
            offline: Arc::new(OfflineQueue::new(offline_capacity)),
            handlers: Arc::new(handlers),
            jwt_secret,
            started_at: Utc::now(),
        }
    }

    /// Deliver an outbound frame to a user's live connection, or buffer it in
    /// the offline queue when none exists. Returns whether delivery was live.
    pub fn deliver_or_queue(&self, channel: ChannelType, user_id: &str, frame: Value) -> bool {
        if self
            .registry
            .send_to(channel, user_id, protocol::to_message(&frame))
            .is_ok()
        {
            return true;
        }
        self.offline.enqueue(channel, user_id, frame);

        // A connection may have registered (and flushed) between the failed
        // send and the enqueue; drain again so the frame is not stranded in
        // the buffer until the next reconnect.
        if self.registry.lookup_sender(channel, user_id).is_some() {
            for entry in self.offline.flush(channel, user_id) {
                let _ = self
                    .registry
                    .send_to(channel, user_id, protocol::to_message(&entry.payload));
            }
        }
        false
    }
}
