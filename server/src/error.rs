//! Error taxonomy for the realtime gateway.
//!
//! Authentication failures are fatal to the connection attempt and map to
//! distinct WebSocket close codes. Everything else is recovered locally and
//! reported in-band as an `error` frame carrying a stable `error_code`, so a
//! single malformed or throttled message never terminates a healthy session.

use thiserror::Error;

/// Why a connection attempt was refused. Each variant closes the socket
/// with its own code so clients can branch without string-matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("credential expired")]
    Expired,
    #[error("credential invalid")]
    Invalid,
    #[error("user id does not match credential")]
    UserMismatch,
    #[error("insufficient role")]
    Forbidden,
}

impl AuthError {
    /// WebSocket close code for this refusal (4000-range, application-defined).
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::Expired => crate::ws::CLOSE_TOKEN_EXPIRED,
            AuthError::Invalid => crate::ws::CLOSE_TOKEN_INVALID,
            AuthError::MissingCredential => crate::ws::CLOSE_TOKEN_MISSING,
            AuthError::UserMismatch => crate::ws::CLOSE_USER_MISMATCH,
            AuthError::Forbidden => crate::ws::CLOSE_FORBIDDEN,
        }
    }

    pub fn close_reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "Missing credential",
            AuthError::Expired => "Token expired",
            AuthError::Invalid => "Token invalid",
            AuthError::UserMismatch => "User id mismatch",
            AuthError::Forbidden => "Insufficient role",
        }
    }
}

/// In-band rejection of a single inbound frame. The connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed JSON frame")]
    MalformedFrame,
    #[error("missing `type` field")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code carried in the `error` frame.
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::MalformedFrame => "malformed_frame",
            ValidationError::MissingType => "missing_type",
            ValidationError::UnknownType(_) => "unknown_type",
            ValidationError::InvalidField { .. } => "invalid_field",
        }
    }

    /// The offending field, when one can be named.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Failure raised by a business-logic handler. `Rejected` carries a message
/// safe to show to the client; `Internal` detail is logged, never sent.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Rejected(String),
    #[error("internal handler failure: {0}")]
    Internal(String),
}

/// Send to a dead socket. Treated as an implicit disconnect: the registry
/// entry is evicted and fan-out continues with the remaining recipients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("recipient {user_id} unreachable on {channel}")]
pub struct DeliveryError {
    pub channel: crate::ws::ChannelType,
    pub user_id: String,
}
