//! Route table: `/v1/*` (chat-completions + passthrough), `/health`,
//! `/ws` (notification hub), `/api/*` (decision API). Any other path
//! — the dashboard UI's territory, an external collaborator this crate
//! doesn't implement — 404s (`spec.md §6`: "GET / and other
//! non-reserved paths — static UI").

use axum::routing::{any, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::chat::v1_catch_all;
use crate::decision_api::{
    get_session, get_sessions, get_settings, health, point1_action, point2_action,
    update_settings,
};
use crate::error::not_found_json;
use crate::hub::ws_handler;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/sessions", get(get_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/point1", post(point1_action))
        .route("/sessions/{id}/point2", post(point2_action))
        .route("/settings", get(get_settings).put(update_settings));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .route("/v1/{*rest}", any(v1_catch_all))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> axum::response::Response {
    not_found_json("not found")
}
