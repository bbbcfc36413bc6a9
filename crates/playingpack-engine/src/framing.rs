//! Converting between the two shapes a buffered response can take: a
//! list of already-framed SSE payload strings (`data: ...\n\n`), or a
//! single non-streaming JSON body.
//!
//! A stream-recorded cache entry replayed to a non-streaming caller
//! has its SSE framing stripped and is reassembled into one JSON
//! object via the SSE parser, rather than handed back as invalid
//! JSON. The symmetric case — a non-streaming-recorded entry replayed
//! to a streaming caller — is handled by synthesizing SSE framing
//! from the JSON body, in the same chunk shape the mock generator
//! uses.

use chrono::Utc;
use playingpack_sse::SseParser;
use serde_json::{json, Value};

/// Whether `chunks` are SSE-framed payloads (as opposed to one JSON body).
pub fn is_sse_framed(chunks: &[String]) -> bool {
    chunks.first().map(|c| c.trim_start().starts_with("data:")).unwrap_or(false)
}

/// Strip the `data: ` prefix and trailing blank line from one framed
/// chunk, leaving the raw payload (`[DONE]` or a JSON chunk string).
pub fn payload_of(chunk: &str) -> &str {
    chunk.trim().strip_prefix("data:").map(str::trim).unwrap_or_else(|| chunk.trim())
}

/// Feed SSE-framed chunks through a fresh parser and assemble a single
/// non-streaming `chat.completion` JSON body. The HTTP status of the
/// acquired response travels alongside this body, not inside it;
/// callers already track it separately.
pub fn assemble_json_from_sse(chunks: &[String], model: Option<&str>) -> Value {
    let parser = SseParser::parse_complete(chunks.iter().map(|c| payload_of(c)));

    json!({
        "id": format!("chatcmpl-{}", Utc::now().timestamp_millis()),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": model.unwrap_or("unknown"),
        "choices": [{
            "index": 0,
            "message": parser.assembled_message(),
            "finish_reason": parser.finish_reason(),
        }],
        "usage": parser.usage(),
    })
}

fn chunk_json(id: &str, created: i64, model: &str, delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    })
}

fn framed(value: &Value) -> String {
    format!("data: {value}\n\n")
}

/// Synthesize SSE framing from a non-streaming `chat.completion` body,
/// for the case where a non-streaming-recorded cache entry (or a
/// non-streaming LLM/mock response) is replayed to a caller that asked
/// for `stream: true`.
pub fn synthesize_sse_from_json(body: &Value) -> Vec<String> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("chatcmpl-{}", Utc::now().timestamp_millis()));
    let model = body.get("model").and_then(Value::as_str).unwrap_or("unknown").to_string();
    let created = body.get("created").and_then(Value::as_i64).unwrap_or_else(|| Utc::now().timestamp());
    let choice = &body["choices"][0];
    let message = &choice["message"];
    let finish_reason = choice.get("finish_reason").and_then(Value::as_str).map(str::to_string);

    let mut chunks = Vec::new();
    let content = message.get("content").and_then(Value::as_str);
    let tool_calls = message.get("tool_calls").and_then(Value::as_array);

    if let Some(tool_calls) = tool_calls.filter(|v| !v.is_empty()) {
        chunks.push(framed(&chunk_json(
            &id,
            created,
            &model,
            json!({"role": "assistant", "content": Value::Null}),
            None,
        )));
        for (index, call) in tool_calls.iter().enumerate() {
            chunks.push(framed(&chunk_json(
                &id,
                created,
                &model,
                json!({
                    "tool_calls": [{
                        "index": index,
                        "id": call.get("id"),
                        "type": "function",
                        "function": call.get("function"),
                    }]
                }),
                None,
            )));
        }
    } else {
        chunks.push(framed(&chunk_json(
            &id,
            created,
            &model,
            json!({"role": "assistant", "content": ""}),
            None,
        )));
        if let Some(content) = content.filter(|c| !c.is_empty()) {
            chunks.push(framed(&chunk_json(
                &id,
                created,
                &model,
                json!({"content": content}),
                None,
            )));
        }
    }

    chunks.push(framed(&chunk_json(&id, created, &model, json!({}), finish_reason.as_deref())));
    if let Some(usage) = body.get("usage").filter(|u| !u.is_null()) {
        let mut usage_chunk = chunk_json(&id, created, &model, json!({}), None);
        usage_chunk["usage"] = usage.clone();
        chunks.push(framed(&usage_chunk));
    }
    chunks.push("data: [DONE]\n\n".to_string());
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_sse_framed_detects_data_prefix() {
        assert!(is_sse_framed(&["data: {}\n\n".to_string()]));
        assert!(!is_sse_framed(&["{\"ok\":true}".to_string()]));
        assert!(!is_sse_framed(&[]));
    }

    #[test]
    fn assemble_json_from_sse_strips_framing_and_reassembles() {
        let chunks = vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n".to_string(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n".to_string(),
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n".to_string(),
            "data: [DONE]\n\n".to_string(),
        ];
        let body = assemble_json_from_sse(&chunks, Some("gpt-4"));
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["content"], "hi");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn synthesize_sse_from_json_roundtrips_text_content() {
        let body = json!({
            "id": "chatcmpl-abc",
            "model": "gpt-4",
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
        });
        let chunks = synthesize_sse_from_json(&body);
        assert!(chunks.last().unwrap() == "data: [DONE]\n\n");

        let reassembled = assemble_json_from_sse(&chunks, Some("gpt-4"));
        assert_eq!(reassembled["choices"][0]["message"]["content"], "hello");
        assert_eq!(reassembled["choices"][0]["finish_reason"], "stop");
    }
}
