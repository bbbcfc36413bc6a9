//! The decision API: a typed request/response surface mirroring the
//! notification hub's inbound messages, for clients that prefer
//! call/response over a persistent socket (`spec.md §4.9`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use playingpack_core::{Point1Action, Point2Action, Session, Settings};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.engine.broker().list())
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.engine.broker().get(id) {
        Some(session) => Json(session).into_response(),
        None => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": { "message": "session not found" } })))
                .into_response()
        }
    }
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.engine.settings().snapshot())
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Json<Settings> {
    state.engine.settings().update(settings.clone());
    Json(settings)
}

pub async fn point1_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(action): Json<Point1Action>,
) -> Json<serde_json::Value> {
    let success = state.engine.broker().resolve_point1(id, action);
    Json(json!({ "success": success }))
}

pub async fn point2_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(action): Json<Point2Action>,
) -> Json<serde_json::Value> {
    let success = state.engine.broker().resolve_point2(id, action);
    Json(json!({ "success": success }))
}
