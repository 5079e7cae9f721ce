use axum::Router;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router: one WebSocket endpoint per channel-type, each
/// scoped to a user id, plus a health check.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/ws/chat/{user_id}",
            axum::routing::get(ws_handler::chat_upgrade),
        )
        .route(
            "/ws/dashboard/{user_id}",
            axum::routing::get(ws_handler::dashboard_upgrade),
        )
        .route(
            "/ws/notifications/{user_id}",
            axum::routing::get(ws_handler::notifications_upgrade),
        )
        .route(
            "/ws/admin/{user_id}",
            axum::routing::get(ws_handler::admin_upgrade),
        )
        .route("/health", axum::routing::get(health_check))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
