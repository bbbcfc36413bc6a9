//! Translating engine and egress failures into the JSON error bodies
//! the spec names (`§7 Error handling design`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub fn egress_error(err: playingpack_egress::EgressError) -> Response {
    tracing::error!(%err, "passthrough request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": { "message": err.to_string(), "type": "proxy_error" } })),
    )
        .into_response()
}

pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": { "message": message, "type": "invalid_request_error" } })),
    )
        .into_response()
}

pub fn not_found_json(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "message": message, "type": "not_found" } })),
    )
        .into_response()
}
