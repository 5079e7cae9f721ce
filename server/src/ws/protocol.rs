//! Wire protocol: inbound frame parsing/validation and outbound envelopes.
//!
//! Inbound frames are JSON objects with a `type` discriminator. Each channel
//! has a closed table of recognized types; anything else is answered with an
//! in-band `error` frame, never a connection close. Outbound frames always
//! carry `type`, `timestamp` (ISO-8601) and `connection_type`; broadcast
//! frames additionally set `"broadcast": true`.

use axum::extract::ws::Message;
use serde_json::{Map, Value, json};

use crate::error::ValidationError;
use crate::ws::ChannelType;

pub const MAX_CHAT_MESSAGE_CHARS: usize = 4000;
pub const MAX_ANNOUNCEMENT_CHARS: usize = 2000;
pub const DEFAULT_HISTORY_LIMIT: u64 = 50;
pub const MAX_HISTORY_LIMIT: u64 = 200;

/// A validated inbound request. One closed set across all channels; which
/// variants a channel accepts is decided by the dispatch table in [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Heartbeat,
    // chat
    ChatMessage {
        message: String,
        session_id: Option<String>,
    },
    GetChatHistory {
        session_id: Option<String>,
        limit: u64,
    },
    // dashboard
    RefreshDashboard,
    GetTransactions {
        filters: Value,
    },
    GetAnalytics {
        period: String,
    },
    // notifications
    GetNotifications {
        page: u64,
        per_page: u64,
    },
    MarkRead {
        notification_id: String,
    },
    MarkAllRead,
    DeleteNotification {
        notification_id: String,
    },
    // admin
    GetStats,
    BroadcastAnnouncement {
        announcement: String,
        target: BroadcastTarget,
    },
}

/// Where an admin announcement goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTarget {
    All,
    Channel(ChannelType),
}

/// Parse and validate one inbound frame for `channel`.
pub fn parse(channel: ChannelType, raw: &str) -> Result<Request, ValidationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|_| ValidationError::MalformedFrame)?;
    let obj = value.as_object().ok_or(ValidationError::MalformedFrame)?;
    let msg_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingType)?;

    match (channel, msg_type) {
        (_, "heartbeat") => Ok(Request::Heartbeat),

        (ChannelType::Chat, "chat_message") => parse_chat_message(obj),
        (ChannelType::Chat, "get_chat_history") => parse_get_chat_history(obj),

        (ChannelType::Dashboard, "refresh_dashboard") => Ok(Request::RefreshDashboard),
        (ChannelType::Dashboard, "get_transactions") => parse_get_transactions(obj),
        (ChannelType::Dashboard, "get_analytics") => parse_get_analytics(obj),

        (ChannelType::Notifications, "get_notifications") => parse_get_notifications(obj),
        (ChannelType::Notifications, "mark_read") => Ok(Request::MarkRead {
            notification_id: require_str(obj, "notification_id")?,
        }),
        (ChannelType::Notifications, "mark_all_read") => Ok(Request::MarkAllRead),
        (ChannelType::Notifications, "delete_notification") => Ok(Request::DeleteNotification {
            notification_id: require_str(obj, "notification_id")?,
        }),

        (ChannelType::Admin, "get_stats") => Ok(Request::GetStats),
        (ChannelType::Admin, "broadcast_announcement") => parse_broadcast_announcement(obj),

        (_, unknown) => Err(ValidationError::UnknownType(unknown.to_string())),
    }
}

fn parse_chat_message(obj: &Map<String, Value>) -> Result<Request, ValidationError> {
    let message = require_str(obj, "message")?;
    if message.chars().count() > MAX_CHAT_MESSAGE_CHARS {
        return Err(ValidationError::invalid(
            "message",
            format!("must be at most {MAX_CHAT_MESSAGE_CHARS} characters"),
        ));
    }
    Ok(Request::ChatMessage {
        message,
        session_id: optional_str(obj, "session_id")?,
    })
}

fn parse_get_chat_history(obj: &Map<String, Value>) -> Result<Request, ValidationError> {
    let limit = optional_uint(obj, "limit")?.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(ValidationError::invalid(
            "limit",
            format!("must be between 1 and {MAX_HISTORY_LIMIT}"),
        ));
    }
    Ok(Request::GetChatHistory {
        session_id: optional_str(obj, "session_id")?,
        limit,
    })
}

fn parse_get_transactions(obj: &Map<String, Value>) -> Result<Request, ValidationError> {
    let filters = match obj.get("filters") {
        None | Some(Value::Null) => json!({}),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => {
            return Err(ValidationError::invalid("filters", "must be an object"));
        }
    };
    Ok(Request::GetTransactions { filters })
}

fn parse_get_analytics(obj: &Map<String, Value>) -> Result<Request, ValidationError> {
    let period = require_str(obj, "period")?;
    match period.as_str() {
        "week" | "month" | "quarter" | "year" => Ok(Request::GetAnalytics { period }),
        _ => Err(ValidationError::invalid(
            "period",
            "must be one of week, month, quarter, year",
        )),
    }
}

fn parse_get_notifications(obj: &Map<String, Value>) -> Result<Request, ValidationError> {
    let page = require_uint(obj, "page")?;
    if page < 1 {
        return Err(ValidationError::invalid("page", "must be at least 1"));
    }
    let per_page = require_uint(obj, "per_page")?;
    if !(1..=100).contains(&per_page) {
        return Err(ValidationError::invalid(
            "per_page",
            "must be between 1 and 100",
        ));
    }
    Ok(Request::GetNotifications { page, per_page })
}

fn parse_broadcast_announcement(obj: &Map<String, Value>) -> Result<Request, ValidationError> {
    let announcement = require_str(obj, "announcement")?;
    if announcement.chars().count() > MAX_ANNOUNCEMENT_CHARS {
        return Err(ValidationError::invalid(
            "announcement",
            format!("must be at most {MAX_ANNOUNCEMENT_CHARS} characters"),
        ));
    }
    let target = match obj.get("target_type") {
        None | Some(Value::Null) => BroadcastTarget::All,
        Some(Value::String(s)) if s == "all" => BroadcastTarget::All,
        Some(Value::String(s)) => match serde_json::from_value::<ChannelType>(json!(s)) {
            Ok(channel) => BroadcastTarget::Channel(channel),
            Err(_) => {
                return Err(ValidationError::invalid(
                    "target_type",
                    "must be \"all\" or a channel name",
                ));
            }
        },
        Some(_) => {
            return Err(ValidationError::invalid("target_type", "must be a string"));
        }
    };
    Ok(Request::BroadcastAnnouncement {
        announcement,
        target,
    })
}

// -- field helpers ----------------------------------------------------------

fn require_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(ValidationError::invalid(field, "must not be empty")),
        Some(_) => Err(ValidationError::invalid(field, "must be a string")),
        None => Err(ValidationError::invalid(field, "is required")),
    }
}

fn optional_str(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::invalid(field, "must be a string")),
    }
}

fn require_uint(obj: &Map<String, Value>, field: &'static str) -> Result<u64, ValidationError> {
    match obj.get(field) {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| ValidationError::invalid(field, "must be a non-negative integer")),
        None => Err(ValidationError::invalid(field, "is required")),
    }
}

fn optional_uint(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<u64>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| ValidationError::invalid(field, "must be a non-negative integer")),
    }
}

// -- outbound envelopes -----------------------------------------------------

/// Server-originated frame with a `data` payload.
pub fn envelope(channel: ChannelType, msg_type: &str, data: Value) -> Value {
    json!({
        "type": msg_type,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connection_type": channel.as_str(),
        "data": data,
    })
}

/// Server-originated frame with no payload beyond the envelope itself.
pub fn simple(channel: ChannelType, msg_type: &str) -> Value {
    json!({
        "type": msg_type,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connection_type": channel.as_str(),
    })
}

pub fn heartbeat_ack(channel: ChannelType) -> Value {
    simple(channel, "heartbeat_ack")
}

/// In-band error frame for a rejected inbound frame.
pub fn validation_error(channel: ChannelType, err: &ValidationError) -> Value {
    let mut frame = json!({
        "type": "error",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connection_type": channel.as_str(),
        "error_code": err.error_code(),
        "message": err.to_string(),
    });
    if let Some(field) = err.field() {
        frame["field"] = json!(field);
    }
    frame
}

/// In-band error frame with an explicit code and client-safe message.
pub fn error_frame(channel: ChannelType, error_code: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connection_type": channel.as_str(),
        "error_code": error_code,
        "message": message,
    })
}

pub fn rate_limited(channel: ChannelType, retry_after: u64) -> Value {
    json!({
        "type": "error",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connection_type": channel.as_str(),
        "error_code": "rate_limited",
        "message": "Too many messages, slow down",
        "retry_after": retry_after,
    })
}

/// Fan-out frame; sets the broadcast marker.
pub fn broadcast_frame(channel: ChannelType, msg_type: &str, data: Value) -> Value {
    let mut frame = envelope(channel, msg_type, data);
    frame["broadcast"] = json!(true);
    frame
}

/// Serialize a frame for the wire.
pub fn to_message(frame: &Value) -> Message {
    Message::Text(frame.to_string().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_parses_on_every_channel() {
        for channel in ChannelType::ALL {
            assert_eq!(
                parse(channel, r#"{"type":"heartbeat"}"#).unwrap(),
                Request::Heartbeat
            );
        }
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = parse(ChannelType::Chat, "{not json").unwrap_err();
        assert_eq!(err.error_code(), "malformed_frame");
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = parse(ChannelType::Chat, r#"{"message":"hi"}"#).unwrap_err();
        assert_eq!(err.error_code(), "missing_type");
    }

    #[test]
    fn unknown_type_is_rejected_per_channel() {
        // Valid on dashboard, unknown on chat.
        let err = parse(ChannelType::Chat, r#"{"type":"refresh_dashboard"}"#).unwrap_err();
        assert_eq!(err, ValidationError::UnknownType("refresh_dashboard".into()));
    }

    #[test]
    fn chat_message_roundtrip() {
        let req = parse(
            ChannelType::Chat,
            r#"{"type":"chat_message","message":"how do I budget?","session_id":"s1"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::ChatMessage {
                message: "how do I budget?".into(),
                session_id: Some("s1".into()),
            }
        );
    }

    #[test]
    fn chat_message_rejects_empty_and_oversized() {
        let err =
            parse(ChannelType::Chat, r#"{"type":"chat_message","message":"  "}"#).unwrap_err();
        assert_eq!(err.field(), Some("message"));

        let long = "x".repeat(MAX_CHAT_MESSAGE_CHARS + 1);
        let raw = format!(r#"{{"type":"chat_message","message":"{long}"}}"#);
        let err = parse(ChannelType::Chat, &raw).unwrap_err();
        assert_eq!(err.field(), Some("message"));
    }

    #[test]
    fn get_notifications_validates_ranges() {
        let ok = parse(
            ChannelType::Notifications,
            r#"{"type":"get_notifications","page":1,"per_page":20}"#,
        )
        .unwrap();
        assert_eq!(
            ok,
            Request::GetNotifications {
                page: 1,
                per_page: 20
            }
        );

        let err = parse(
            ChannelType::Notifications,
            r#"{"type":"get_notifications","page":0,"per_page":20}"#,
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("page"));

        let err = parse(
            ChannelType::Notifications,
            r#"{"type":"get_notifications","page":1,"per_page":101}"#,
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("per_page"));

        let err = parse(
            ChannelType::Notifications,
            r#"{"type":"get_notifications","page":"one","per_page":20}"#,
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("page"));
    }

    #[test]
    fn analytics_period_is_a_closed_set() {
        let ok = parse(
            ChannelType::Dashboard,
            r#"{"type":"get_analytics","period":"month"}"#,
        )
        .unwrap();
        assert_eq!(ok, Request::GetAnalytics { period: "month".into() });

        let err = parse(
            ChannelType::Dashboard,
            r#"{"type":"get_analytics","period":"decade"}"#,
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("period"));
    }

    #[test]
    fn broadcast_announcement_targets() {
        let req = parse(
            ChannelType::Admin,
            r#"{"type":"broadcast_announcement","announcement":"maintenance at noon"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::BroadcastAnnouncement {
                announcement: "maintenance at noon".into(),
                target: BroadcastTarget::All,
            }
        );

        let req = parse(
            ChannelType::Admin,
            r#"{"type":"broadcast_announcement","announcement":"hi","target_type":"chat"}"#,
        )
        .unwrap();
        assert!(matches!(
            req,
            Request::BroadcastAnnouncement {
                target: BroadcastTarget::Channel(ChannelType::Chat),
                ..
            }
        ));

        let err = parse(
            ChannelType::Admin,
            r#"{"type":"broadcast_announcement","announcement":"hi","target_type":"smoke"}"#,
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("target_type"));
    }

    #[test]
    fn outbound_envelope_carries_required_fields() {
        let frame = envelope(ChannelType::Chat, "chat_response", serde_json::json!({"x": 1}));
        assert_eq!(frame["type"], "chat_response");
        assert_eq!(frame["connection_type"], "chat");
        assert!(frame["timestamp"].as_str().is_some());
        assert_eq!(frame["data"]["x"], 1);
        assert!(frame.get("broadcast").is_none());
    }

    #[test]
    fn broadcast_frame_sets_marker() {
        let frame = broadcast_frame(ChannelType::Chat, "announcement", serde_json::json!({}));
        assert_eq!(frame["broadcast"], true);
    }

    #[test]
    fn rate_limited_frame_carries_retry_after() {
        let frame = rate_limited(ChannelType::Chat, 42);
        assert_eq!(frame["error_code"], "rate_limited");
        assert_eq!(frame["retry_after"], 42);
    }
}
