//! In-memory reference handlers.
//!
//! Used by the standalone binary and the integration tests so the full
//! router/queue path can be exercised without the platform services. The
//! production deployment registers handlers backed by the chat, finance and
//! notification services instead; nothing here persists across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::HandlerError;
use crate::handlers::{ChannelHandler, HandlerResponse};
use crate::ws::protocol::Request;

#[derive(Debug, Clone)]
struct ChatTurn {
    sender: &'static str,
    text: String,
    at: DateTime<Utc>,
}

/// Chat sessions per (user, session). Replies acknowledge the message; the
/// real chatbot collaborator is out of scope here.
pub struct MemoryChat {
    sessions: DashMap<(String, String), Vec<ChatTurn>>,
}

impl MemoryChat {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl Default for MemoryChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelHandler for MemoryChat {
    async fn handle(
        &self,
        user_id: &str,
        request: Request,
    ) -> Result<HandlerResponse, HandlerError> {
        match request {
            Request::ChatMessage {
                message,
                session_id,
            } => {
                let session_id = session_id.unwrap_or_else(|| Uuid::now_v7().to_string());
                let reply = format!("Got it — you said: {message}");
                let mut turns = self
                    .sessions
                    .entry((user_id.to_string(), session_id.clone()))
                    .or_default();
                turns.push(ChatTurn {
                    sender: "user",
                    text: message,
                    at: Utc::now(),
                });
                turns.push(ChatTurn {
                    sender: "assistant",
                    text: reply.clone(),
                    at: Utc::now(),
                });

                Ok(HandlerResponse::new(
                    "chat_response",
                    json!({ "session_id": session_id, "reply": reply }),
                ))
            }
            Request::GetChatHistory { session_id, limit } => {
                let turns: Vec<Value> = self
                    .sessions
                    .iter()
                    .filter(|entry| {
                        entry.key().0 == user_id
                            && session_id
                                .as_deref()
                                .is_none_or(|sid| entry.key().1 == sid)
                    })
                    .flat_map(|entry| {
                        entry
                            .value()
                            .iter()
                            .map(|turn| {
                                json!({
                                    "sender": turn.sender,
                                    "text": turn.text,
                                    "at": turn.at.to_rfc3339(),
                                })
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect();
                let start = turns.len().saturating_sub(limit as usize);

                Ok(HandlerResponse::new(
                    "chat_history",
                    json!({ "session_id": session_id, "messages": &turns[start..] }),
                ))
            }
            other => Err(HandlerError::Internal(format!(
                "chat handler received unexpected request: {other:?}"
            ))),
        }
    }
}

/// Dashboard snapshots. Figures are placeholders; computing real ones is the
/// finance service's job.
pub struct MemoryDashboard;

impl MemoryDashboard {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MemoryDashboard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelHandler for MemoryDashboard {
    async fn handle(
        &self,
        user_id: &str,
        request: Request,
    ) -> Result<HandlerResponse, HandlerError> {
        match request {
            Request::RefreshDashboard => Ok(HandlerResponse::new(
                "dashboard_data",
                json!({
                    "user_id": user_id,
                    "balance": 0.0,
                    "budgets": [],
                    "generated_at": Utc::now().to_rfc3339(),
                }),
            )),
            Request::GetTransactions { filters } => Ok(HandlerResponse::new(
                "transactions",
                json!({ "items": [], "filters": filters }),
            )),
            Request::GetAnalytics { period } => Ok(HandlerResponse::new(
                "analytics",
                json!({ "period": period, "summary": {} }),
            )),
            other => Err(HandlerError::Internal(format!(
                "dashboard handler received unexpected request: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct Notification {
    id: String,
    title: String,
    body: String,
    read: bool,
    created_at: DateTime<Utc>,
}

/// Notification store per user, newest first.
pub struct MemoryNotifications {
    store: DashMap<String, Vec<Notification>>,
}

impl MemoryNotifications {
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    /// Record a notification for a user and return its id. The caller is
    /// responsible for live delivery or offline queueing.
    pub fn push(&self, user_id: &str, title: &str, body: &str) -> String {
        let id = Uuid::now_v7().to_string();
        self.store
            .entry(user_id.to_string())
            .or_default()
            .push(Notification {
                id: id.clone(),
                title: title.to_string(),
                body: body.to_string(),
                read: false,
                created_at: Utc::now(),
            });
        id
    }

    fn unread_count(&self, user_id: &str) -> usize {
        self.store
            .get(user_id)
            .map(|items| items.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }
}

impl Default for MemoryNotifications {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelHandler for MemoryNotifications {
    async fn handle(
        &self,
        user_id: &str,
        request: Request,
    ) -> Result<HandlerResponse, HandlerError> {
        match request {
            Request::GetNotifications { page, per_page } => {
                let items = self.store.get(user_id);
                let all: Vec<&Notification> = items
                    .as_deref()
                    .map(|v| v.iter().rev().collect())
                    .unwrap_or_default();
                let total = all.len();
                let unread = all.iter().filter(|n| !n.read).count();
                // `page` has no upper bound at the protocol level; saturate
                // so an extreme value yields an empty page, never a panic.
                let start = usize::try_from(page.saturating_sub(1).saturating_mul(per_page))
                    .unwrap_or(usize::MAX);
                let page_items: Vec<Value> = all
                    .into_iter()
                    .skip(start)
                    .take(per_page as usize)
                    .map(|n| {
                        json!({
                            "id": n.id,
                            "title": n.title,
                            "body": n.body,
                            "read": n.read,
                            "created_at": n.created_at.to_rfc3339(),
                        })
                    })
                    .collect();

                Ok(HandlerResponse::new(
                    "notifications_list",
                    json!({
                        "items": page_items,
                        "page": page,
                        "per_page": per_page,
                        "total": total,
                        "unread": unread,
                    }),
                ))
            }
            Request::MarkRead { notification_id } => {
                let mut found = false;
                if let Some(mut items) = self.store.get_mut(user_id) {
                    if let Some(n) = items.iter_mut().find(|n| n.id == notification_id) {
                        n.read = true;
                        found = true;
                    }
                }
                if !found {
                    return Err(HandlerError::Rejected("unknown notification id".into()));
                }
                Ok(HandlerResponse::new(
                    "notification_marked",
                    json!({ "notification_id": notification_id }),
                ))
            }
            Request::MarkAllRead => {
                let mut updated = 0;
                if let Some(mut items) = self.store.get_mut(user_id) {
                    for n in items.iter_mut().filter(|n| !n.read) {
                        n.read = true;
                        updated += 1;
                    }
                }
                Ok(HandlerResponse::new(
                    "all_marked_read",
                    json!({ "updated": updated }),
                ))
            }
            Request::DeleteNotification { notification_id } => {
                let mut found = false;
                if let Some(mut items) = self.store.get_mut(user_id) {
                    let before = items.len();
                    items.retain(|n| n.id != notification_id);
                    found = items.len() != before;
                }
                if !found {
                    return Err(HandlerError::Rejected("unknown notification id".into()));
                }
                Ok(HandlerResponse::new(
                    "notification_deleted",
                    json!({ "notification_id": notification_id }),
                ))
            }
            other => Err(HandlerError::Internal(format!(
                "notifications handler received unexpected request: {other:?}"
            ))),
        }
    }

    async fn on_connect(&self, user_id: &str) -> Vec<HandlerResponse> {
        vec![HandlerResponse::new(
            "unread_count",
            json!({ "count": self.unread_count(user_id) }),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chat_message_creates_a_session_and_history() {
        let chat = MemoryChat::new();
        let resp = chat
            .handle(
                "alice",
                Request::ChatMessage {
                    message: "hello".into(),
                    session_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.msg_type, "chat_response");
        let session_id = resp.data["session_id"].as_str().unwrap().to_string();

        let resp = chat
            .handle(
                "alice",
                Request::GetChatHistory {
                    session_id: Some(session_id),
                    limit: 50,
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.data["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn notifications_paginate_and_track_unread() {
        let notifs = MemoryNotifications::new();
        for i in 0..5 {
            notifs.push("alice", &format!("n{i}"), "body");
        }
        assert_eq!(notifs.unread_count("alice"), 5);

        let resp = notifs
            .handle(
                "alice",
                Request::GetNotifications {
                    page: 1,
                    per_page: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.msg_type, "notifications_list");
        assert_eq!(resp.data["items"].as_array().unwrap().len(), 2);
        assert_eq!(resp.data["total"], 5);
        // Newest first.
        assert_eq!(resp.data["items"][0]["title"], "n4");

        let id = resp.data["items"][0]["id"].as_str().unwrap().to_string();
        notifs
            .handle("alice", Request::MarkRead {
                notification_id: id,
            })
            .await
            .unwrap();
        assert_eq!(notifs.unread_count("alice"), 4);

        notifs.handle("alice", Request::MarkAllRead).await.unwrap();
        assert_eq!(notifs.unread_count("alice"), 0);
    }

    #[tokio::test]
    async fn pagination_survives_extreme_page_values() {
        let notifs = MemoryNotifications::new();
        notifs.push("alice", "t", "b");

        // The protocol caps per_page but not page; the largest possible page
        // must come back empty, not overflow the offset arithmetic.
        let raw = format!(
            r#"{{"type":"get_notifications","page":{},"per_page":100}}"#,
            u64::MAX
        );
        let request =
            crate::ws::protocol::parse(crate::ws::ChannelType::Notifications, &raw).unwrap();
        let resp = notifs.handle("alice", request).await.unwrap();

        assert_eq!(resp.msg_type, "notifications_list");
        assert!(resp.data["items"].as_array().unwrap().is_empty());
        assert_eq!(resp.data["total"], 1);
    }

    #[tokio::test]
    async fn mark_read_rejects_unknown_id() {
        let notifs = MemoryNotifications::new();
        let err = notifs
            .handle("alice", Request::MarkRead {
                notification_id: "nope".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Rejected(_)));
    }

    #[tokio::test]
    async fn connect_push_reports_unread_count() {
        let notifs = MemoryNotifications::new();
        notifs.push("alice", "t", "b");
        let frames = notifs.on_connect("alice").await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].msg_type, "unread_count");
        assert_eq!(frames[0].data["count"], 1);
    }
}
