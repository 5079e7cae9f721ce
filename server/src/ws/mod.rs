pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod reaper;
pub mod registry;
pub mod router;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system clone this to push frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// WebSocket close codes (application range):
/// 4001 = token expired
/// 4002 = token invalid
/// 4003 = missing credential
/// 4004 = user id does not match credential
/// 4005 = insufficient role (admin channel)
/// 4006 = connection setup failed
/// 4008 = replaced by a newer connection for the same user
/// 4009 = idle timeout (reaper eviction)
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;
pub const CLOSE_TOKEN_MISSING: u16 = 4003;
pub const CLOSE_USER_MISMATCH: u16 = 4004;
pub const CLOSE_FORBIDDEN: u16 = 4005;
pub const CLOSE_SETUP_FAILED: u16 = 4006;
pub const CLOSE_REPLACED: u16 = 4008;
pub const CLOSE_IDLE_TIMEOUT: u16 = 4009;

/// The four logical WebSocket surfaces. Each has its own registry partition,
/// offline queue partition, and message-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Chat,
    Dashboard,
    Notifications,
    Admin,
}

impl ChannelType {
    pub const ALL: [ChannelType; 4] = [
        ChannelType::Chat,
        ChannelType::Dashboard,
        ChannelType::Notifications,
        ChannelType::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Chat => "chat",
            ChannelType::Dashboard => "dashboard",
            ChannelType::Notifications => "notifications",
            ChannelType::Admin => "admin",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
