use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::gate;
use crate::state::AppState;
use crate::ws::{ChannelType, actor};

/// Query parameters for a WebSocket connection. Auth is via `?token=JWT`;
/// absence is a distinct refusal, so the field is optional here.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws/chat/{user_id}?token=JWT
pub async fn chat_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ChannelType::Chat, state, user_id, params.token, ws)
}

/// GET /ws/dashboard/{user_id}?token=JWT
pub async fn dashboard_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ChannelType::Dashboard, state, user_id, params.token, ws)
}

/// GET /ws/notifications/{user_id}?token=JWT
pub async fn notifications_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ChannelType::Notifications, state, user_id, params.token, ws)
}

/// GET /ws/admin/{user_id}?token=JWT — additionally requires the admin role.
pub async fn admin_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ChannelType::Admin, state, user_id, params.token, ws)
}

/// Authenticate, then either spawn the connection actor or upgrade and
/// immediately close with the refusal's close code.
fn upgrade(
    channel: ChannelType,
    state: AppState,
    user_id: String,
    token: Option<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match gate::authenticate(&state.jwt_secret, token.as_deref(), &user_id, channel) {
        Ok(identity) => {
            tracing::info!(
                channel = %channel,
                user_id = %identity.user_id,
                role = identity.role.as_str(),
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, channel, identity))
        }
        Err(err) => {
            let code = err.close_code();
            let reason = err.close_reason();
            tracing::warn!(
                channel = %channel,
                user_id,
                close_code = code,
                reason,
                "WebSocket auth failed"
            );

            // Upgrade the connection, then immediately close with the code
            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}
