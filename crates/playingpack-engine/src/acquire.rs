//! The three response-acquisition paths: cache replay, forwarding to
//! the upstream, and mock synthesis. Each fully drains its source into
//! an [`Acquired`] buffer — nothing is written to the caller from
//! here; that only happens once point 2 (if any) resolves.
//!
//! While draining, each path feeds payloads through a local
//! [`SseParser`] (or, for a non-streaming source, a direct JSON
//! extraction) so the session's assembled view — content, tool calls,
//! finish reason, usage — tracks the acquisition as it happens.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;
use eventsource_stream::EventStream;
use futures::StreamExt;
use playingpack_broker::SessionBroker;
use playingpack_cache::{replay, CacheStore, CachedRequest};
use playingpack_egress::{ForwardRequest, UpstreamClient};
use playingpack_sse::{SseEvent, SseParser};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// A fully-buffered response, not yet emitted. `chunks` holds the raw
/// payload strings as they came from the source: SSE-framed
/// (`data: ...\n\n`) for a streaming source, or a single JSON string for
/// a non-streaming one. See [`crate::framing`] for how this is turned
/// into the final emission shape.
pub struct Acquired {
    pub status: u16,
    pub chunks: Vec<String>,
}

/// Feed one SSE payload through `parser` and mirror the observed event
/// into the session via `broker`.
fn ingest_sse_event(broker: &SessionBroker, id: Uuid, parser: &mut SseParser, payload: &str) {
    match parser.process_payload(payload) {
        SseEvent::Content(text) => broker.append_content(id, &text),
        SseEvent::ToolCallUpdate(index) => {
            if let Some(call) = parser.tool_calls().into_iter().find(|c| c.index == index) {
                broker.set_tool_call(id, call);
            }
        }
        SseEvent::FinishReason(reason) => broker.set_finish_reason(id, reason),
        SseEvent::Usage => {
            if let Some(usage) = parser.usage() {
                broker.set_usage(id, usage.clone());
            }
        }
        SseEvent::Done | SseEvent::Unchanged | SseEvent::Malformed(_) => {}
    }
}

/// Mirror a non-streaming `chat.completion` body into the session in
/// one shot (there are no incremental deltas to replay).
fn ingest_json_body(broker: &SessionBroker, id: Uuid, body: &Value) {
    let message = &body["choices"][0]["message"];
    if let Some(content) = message.get("content").and_then(Value::as_str) {
        broker.append_content(id, content);
    }
    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for (index, call) in tool_calls.iter().enumerate() {
            broker.set_tool_call(
                id,
                playingpack_core::ToolCall {
                    index: index as u32,
                    id: call.get("id").and_then(Value::as_str).map(str::to_string),
                    name: call["function"]["name"].as_str().map(str::to_string),
                    arguments: call["function"]["arguments"].as_str().unwrap_or_default().to_string(),
                },
            );
        }
    }
    if let Some(reason) = body["choices"][0]["finish_reason"].as_str() {
        broker.set_finish_reason(id, reason.to_string());
    }
    if let Some(usage) = body.get("usage").filter(|u| !u.is_null()) {
        broker.set_usage(id, usage.clone());
    }
}

/// Replay a cached record in full, ingesting it into the session as it
/// drains. `None` if no record exists for `fingerprint`.
pub async fn acquire_from_cache(
    store: &CacheStore,
    broker: &SessionBroker,
    id: Uuid,
    fingerprint: &str,
) -> Option<Acquired> {
    let record = store.load(fingerprint).await?;
    let status = record.response.status;
    let stream = replay(record, true, Arc::new(AtomicBool::new(false)));
    tokio::pin!(stream);

    let mut chunks = Vec::new();
    let mut parser = SseParser::new();
    let mut sse_mode: Option<bool> = None;

    while let Some(chunk) = stream.next().await {
        let is_sse = *sse_mode.get_or_insert_with(|| crate::framing::is_sse_framed(&[chunk.clone()]));
        if is_sse {
            ingest_sse_event(broker, id, &mut parser, crate::framing::payload_of(&chunk));
        }
        chunks.push(chunk);
    }

    if sse_mode == Some(false) {
        if let Some(first) = chunks.first() {
            if let Ok(body) = serde_json::from_str::<Value>(first) {
                ingest_json_body(broker, id, &body);
            }
        }
    }

    Some(Acquired { status, chunks })
}

/// Forward the request upstream, ingesting the response as it streams
/// and — when `cache_writer` is `Some` — persisting it chunk by chunk.
pub async fn acquire_from_llm(
    client: &UpstreamClient,
    broker: &SessionBroker,
    id: Uuid,
    upstream_url: &str,
    headers: http::HeaderMap,
    body: Value,
    mut cache_writer: Option<playingpack_cache::CacheWriter>,
) -> Result<Acquired> {
    let wants_streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(true);

    let response = client
        .forward(ForwardRequest {
            method: http::Method::POST,
            path: "/v1/chat/completions".to_string(),
            headers,
            body: Some(body),
            upstream_url: upstream_url.to_string(),
        })
        .await?;

    let status = response.status;
    let mut chunks = Vec::new();
    let mut parser = SseParser::new();

    if wants_streaming {
        let mut events = EventStream::new(response.body_stream);
        while let Some(event) = events.next().await {
            let event = event.map_err(|err| EngineError::Internal(err.to_string()))?;
            let framed = format!("data: {}\n\n", event.data);
            ingest_sse_event(broker, id, &mut parser, &event.data);
            if let Some(writer) = cache_writer.as_mut() {
                writer.push_chunk(framed.clone());
            }
            chunks.push(framed);
        }
    } else {
        let mut body_bytes = Vec::new();
        let mut byte_stream = response.body_stream;
        while let Some(next) = byte_stream.next().await {
            let next: Bytes = next.map_err(|err| EngineError::Internal(err.to_string()))?;
            body_bytes.extend_from_slice(&next);
        }
        let raw = String::from_utf8_lossy(&body_bytes).into_owned();
        if let Ok(parsed) = serde_json::from_str::<Value>(&raw) {
            ingest_json_body(broker, id, &parsed);
        }
        if let Some(writer) = cache_writer.as_mut() {
            writer.push_chunk(raw.clone());
        }
        chunks.push(raw);
    }

    if let Some(writer) = cache_writer {
        writer.save(status)?;
    }

    Ok(Acquired { status, chunks })
}

/// Build the `CachedRequest` header stored alongside a new cache
/// record.
pub fn cached_request_of(body: &Value) -> CachedRequest {
    CachedRequest {
        model: body.get("model").and_then(Value::as_str).map(str::to_string),
        messages: body.get("messages").cloned().unwrap_or(Value::Null),
    }
}

/// Synthesize a mock response from operator-supplied `content`,
/// ingesting it into the session exactly as the cache/LLM paths do.
pub fn acquire_from_mock(broker: &SessionBroker, id: Uuid, content: &str, streaming: bool) -> Acquired {
    use playingpack_mock::{emit, MockDelays, MockOutput};

    match emit(content, streaming, MockDelays::default()) {
        MockOutput::Chunks(timed) => {
            let mut parser = SseParser::new();
            let mut chunks = Vec::with_capacity(timed.len());
            for chunk in timed {
                ingest_sse_event(broker, id, &mut parser, crate::framing::payload_of(&chunk.data));
                chunks.push(chunk.data);
            }
            Acquired { status: 200, chunks }
        }
        MockOutput::Json { status, body } => {
            ingest_json_body(broker, id, &body);
            Acquired { status, chunks: vec![body.to_string()] }
        }
    }
}
