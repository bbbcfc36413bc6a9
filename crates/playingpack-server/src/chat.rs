//! `/v1/*`: the chat-completions entry point and the transparent
//! passthrough for everything else under `/v1`.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use playingpack_engine::EngineOutcome;

use crate::error::{bad_request, egress_error};
use crate::state::AppState;

/// Caps the body we'll buffer from an inbound request before giving up.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub async fn v1_catch_all(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return bad_request("request body too large or unreadable"),
    };

    if parts.method == Method::POST && parts.uri.path() == CHAT_COMPLETIONS_PATH {
        return chat_completions(state, parts.headers, bytes).await;
    }

    let body_value = parse_optional_json(&bytes);
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    match state
        .engine
        .passthrough(parts.method, &path, parts.headers, body_value)
        .await
    {
        Ok((status, headers, response)) => passthrough_response(status, headers, response),
        Err(err) => egress_error(err),
    }
}

async fn chat_completions(state: AppState, headers: HeaderMap, bytes: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return bad_request("request body is not valid JSON"),
    };

    let id = Uuid::new_v4();
    match state.engine.run_chat_completion(id, headers, body).await {
        EngineOutcome::Sse { chunks, cached, mocked } => sse_response(chunks, cached, mocked),
        EngineOutcome::Json { status, body, cached, mocked } => {
            json_response(status, body, cached, mocked)
        }
    }
}

fn parse_optional_json(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

/// Per-request provenance headers: `x-playingpack-cached` on cache
/// replays, `x-playingpack-mocked` on mock or modify-at-point-2
/// responses.
fn provenance_headers(builder: axum::http::response::Builder, cached: bool, mocked: bool) -> axum::http::response::Builder {
    let builder = if cached { builder.header("x-playingpack-cached", "true") } else { builder };
    if mocked {
        builder.header("x-playingpack-mocked", "true")
    } else {
        builder
    }
}

fn sse_response(chunks: Vec<String>, cached: bool, mocked: bool) -> Response {
    let body = chunks.concat();
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "text/event-stream")
        .header(axum::http::header::CACHE_CONTROL, "no-cache")
        .header(axum::http::header::CONNECTION, "keep-alive");
    provenance_headers(builder, cached, mocked)
        .body(Body::from(body))
        .expect("building a response from a concatenated SSE body never fails")
}

fn json_response(status: u16, body: Value, cached: bool, mocked: bool) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let builder = Response::builder()
        .status(status)
        .header(axum::http::header::CONTENT_TYPE, "application/json");
    provenance_headers(builder, cached, mocked)
        .body(Body::from(body.to_string()))
        .expect("building a response from a serialized JSON value never fails")
}

fn passthrough_response(
    status: u16,
    headers: HeaderMap,
    response: playingpack_egress::ForwardResponse,
) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from_stream(response.body_stream))
        .unwrap_or_else(|_| engine_error_fallback())
}

fn engine_error_fallback() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::from("{\"error\":{\"message\":\"proxy error\",\"type\":\"proxy_error\"}}"))
        .expect("building a fallback response from a static body never fails")
}
