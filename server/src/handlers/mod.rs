//! The business-logic seam.
//!
//! The gateway does not know or care what a handler computes: it validates a
//! frame, gates it through the rate limiter, and hands the typed request to
//! the channel's registered handler. Handlers may do arbitrary async work;
//! each connection runs in its own task so an in-flight handler only stalls
//! its own stream.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::ws::ChannelType;
use crate::ws::protocol::Request;

/// What a handler returns: the outbound frame's `type` plus its `data`.
/// The router wraps it in the standard envelope.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub msg_type: String,
    pub data: Value,
}

impl HandlerResponse {
    pub fn new(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
        }
    }
}

/// One business-logic collaborator per channel.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(
        &self,
        user_id: &str,
        request: Request,
    ) -> Result<HandlerResponse, HandlerError>;

    /// Frames to push right after a connection is established, after the
    /// offline queue has been flushed. Default: nothing.
    async fn on_connect(&self, _user_id: &str) -> Vec<HandlerResponse> {
        Vec::new()
    }
}

/// The registered handler per channel. Admin operations (stats, broadcast)
/// act on gateway-owned state and are handled in the router itself, so the
/// admin channel has no business handler.
#[derive(Clone)]
pub struct HandlerSet {
    pub chat: Arc<dyn ChannelHandler>,
    pub dashboard: Arc<dyn ChannelHandler>,
    pub notifications: Arc<dyn ChannelHandler>,
}

impl HandlerSet {
    pub fn for_channel(&self, channel: ChannelType) -> Option<&Arc<dyn ChannelHandler>> {
        match channel {
            ChannelType::Chat => Some(&self.chat),
            ChannelType::Dashboard => Some(&self.dashboard),
            ChannelType::Notifications => Some(&self.notifications),
            ChannelType::Admin => None,
        }
    }

    /// In-memory reference handlers; see [`memory`].
    pub fn in_memory() -> Self {
        Self {
            chat: Arc::new(memory::MemoryChat::new()),
            dashboard: Arc::new(memory::MemoryDashboard::new()),
            notifications: Arc::new(memory::MemoryNotifications::new()),
        }
    }
}
