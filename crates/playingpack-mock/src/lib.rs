//! Synthesizes OpenAI-shaped chat-completion responses from an
//! operator-supplied content string, for the mock and point-2 `modify`
//! paths where no upstream call is made.

use chrono::Utc;
use serde_json::{json, Value};

/// The three forms an operator content string can take.
#[derive(Debug, Clone, PartialEq)]
pub enum MockContent {
    Text(String),
    ToolCall { name: String, arguments: String },
    Error(String),
}

/// Classify a raw operator content string.
pub fn parse(content: &str) -> MockContent {
    if let Some(message) = content.strip_prefix("ERROR:") {
        return MockContent::Error(message.trim().to_string());
    }

    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(content) {
        if let Some(name) = obj.get("function").and_then(Value::as_str) {
            let arguments = obj.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let arguments =
                serde_json::to_string(&arguments).unwrap_or_else(|_| "{}".to_string());
            return MockContent::ToolCall {
                name: name.to_string(),
                arguments,
            };
        }
    }

    MockContent::Text(content.to_string())
}

/// Configurable pacing between emitted chunks.
#[derive(Debug, Clone, Copy)]
pub struct MockDelays {
    pub text_chunk_ms: u64,
    pub tool_call_chunk_ms: u64,
}

impl Default for MockDelays {
    fn default() -> Self {
        Self {
            text_chunk_ms: 20,
            tool_call_chunk_ms: 10,
        }
    }
}

/// One already-framed SSE payload (`data: <json>\n\n`) plus the delay
/// that should precede it during replay.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedChunk {
    pub data: String,
    pub delay_ms: u64,
}

/// What generating a response for one content string produces.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutput {
    /// Streaming SSE payloads, the last of which is `data: [DONE]\n\n`.
    Chunks(Vec<TimedChunk>),
    /// A complete JSON body with its HTTP status.
    Json { status: u16, body: Value },
}

/// Synthesize a response for `content`. `ERROR:`-prefixed content
/// always yields a non-streaming 400 JSON body regardless of
/// `streaming`, matching upstream's own behaviour for invalid
/// requests.
pub fn emit(content: &str, streaming: bool, delays: MockDelays) -> MockOutput {
    match parse(content) {
        MockContent::Error(message) => MockOutput::Json {
            status: 400,
            body: json!({
                "error": {
                    "message": message,
                    "type": "invalid_request_error",
                    "param": Value::Null,
                    "code": Value::Null,
                }
            }),
        },
        MockContent::Text(text) => {
            if streaming {
                MockOutput::Chunks(emit_text_stream(&text, delays))
            } else {
                MockOutput::Json {
                    status: 200,
                    body: emit_text_complete(&text),
                }
            }
        }
        MockContent::ToolCall { name, arguments } => {
            if streaming {
                MockOutput::Chunks(emit_tool_call_stream(&name, &arguments, delays))
            } else {
                MockOutput::Json {
                    status: 200,
                    body: emit_tool_call_complete(&name, &arguments),
                }
            }
        }
    }
}

fn chunk_json(id: &str, created: i64, delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": "mock",
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    })
}

fn framed(value: &Value, delay_ms: u64) -> TimedChunk {
    TimedChunk {
        data: format!("data: {value}\n\n"),
        delay_ms,
    }
}

fn done_chunk() -> TimedChunk {
    TimedChunk {
        data: "data: [DONE]\n\n".to_string(),
        delay_ms: 0,
    }
}

fn char_chunks(s: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(size)
        .map(|group| group.iter().collect())
        .collect()
}

fn emit_text_stream(text: &str, delays: MockDelays) -> Vec<TimedChunk> {
    let id = format!("chatcmpl-mock-{}", Utc::now().timestamp_millis());
    let created = Utc::now().timestamp();
    let mut chunks = Vec::new();

    chunks.push(framed(
        &chunk_json(&id, created, json!({"role": "assistant", "content": ""}), None),
        0,
    ));

    for token in char_chunks(text, 4) {
        chunks.push(framed(
            &chunk_json(&id, created, json!({"content": token}), None),
            delays.text_chunk_ms,
        ));
    }

    chunks.push(framed(&chunk_json(&id, created, json!({}), Some("stop")), 0));
    chunks.push(done_chunk());
    chunks
}

fn emit_tool_call_stream(name: &str, arguments: &str, delays: MockDelays) -> Vec<TimedChunk> {
    let id = format!("chatcmpl-mock-{}", Utc::now().timestamp_millis());
    let call_id = format!("call_mock_{}", Utc::now().timestamp_millis());
    let created = Utc::now().timestamp();
    let mut chunks = Vec::new();

    chunks.push(framed(
        &chunk_json(
            &id,
            created,
            json!({"role": "assistant", "content": Value::Null}),
            None,
        ),
        0,
    ));

    let mut fragments = char_chunks(arguments, 10).into_iter();
    let first_fragment = fragments.next().unwrap_or_default();

    chunks.push(framed(
        &chunk_json(
            &id,
            created,
            json!({
                "tool_calls": [{
                    "index": 0,
                    "id": call_id,
                    "type": "function",
                    "function": {"name": name, "arguments": first_fragment},
                }]
            }),
            None,
        ),
        delays.tool_call_chunk_ms,
    ));

    for fragment in fragments {
        chunks.push(framed(
            &chunk_json(
                &id,
                created,
                json!({"tool_calls": [{"index": 0, "function": {"arguments": fragment}}]}),
                None,
            ),
            delays.tool_call_chunk_ms,
        ));
    }

    chunks.push(framed(
        &chunk_json(&id, created, json!({}), Some("tool_calls")),
        0,
    ));
    chunks.push(done_chunk());
    chunks
}

fn emit_text_complete(text: &str) -> Value {
    json!({
        "id": format!("chatcmpl-mock-{}", Utc::now().timestamp_millis()),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": "mock",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop",
        }],
    })
}

fn emit_tool_call_complete(name: &str, arguments: &str) -> Value {
    json!({
        "id": format!("chatcmpl-mock-{}", Utc::now().timestamp_millis()),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": "mock",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": [{
                    "id": format!("call_mock_{}", Utc::now().timestamp_millis()),
                    "type": "function",
                    "function": {"name": name, "arguments": arguments},
                }],
            },
            "finish_reason": "tool_calls",
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognises_error_prefix() {
        match parse("ERROR: bad request") {
            MockContent::Error(message) => assert_eq!(message, "bad request"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn parse_recognises_tool_call_object() {
        let content = r#"{"function": "get_weather", "arguments": {"city": "nyc"}}"#;
        match parse(content) {
            MockContent::ToolCall { name, arguments } => {
                assert_eq!(name, "get_weather");
                assert_eq!(arguments, r#"{"city":"nyc"}"#);
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn parse_defaults_arguments_to_empty_object() {
        let content = r#"{"function": "ping"}"#;
        match parse(content) {
            MockContent::ToolCall { arguments, .. } => assert_eq!(arguments, "{}"),
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn parse_falls_back_to_plain_text() {
        match parse("just say hi") {
            MockContent::Text(text) => assert_eq!(text, "just say hi"),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn error_content_always_produces_json_regardless_of_streaming() {
        for streaming in [true, false] {
            match emit("ERROR: nope", streaming, MockDelays::default()) {
                MockOutput::Json { status, body } => {
                    assert_eq!(status, 400);
                    assert_eq!(body["error"]["message"], "nope");
                    assert_eq!(body["error"]["type"], "invalid_request_error");
                }
                other => panic!("expected Json, got {other:?}"),
            }
        }
    }

    #[test]
    fn text_stream_splits_into_four_char_tokens_and_ends_with_done() {
        let output = emit("hello world", true, MockDelays::default());
        let MockOutput::Chunks(chunks) = output else {
            panic!("expected Chunks")
        };

        assert!(chunks.first().unwrap().data.contains("\"role\":\"assistant\""));
        assert_eq!(chunks.last().unwrap().data, "data: [DONE]\n\n");

        let content_tokens: Vec<&str> = chunks[1..chunks.len() - 2]
            .iter()
            .map(|c| c.data.as_str())
            .collect();
        assert_eq!(content_tokens.len(), 3); // "hell", "o wo", "rld" for 11 chars

        for token in &content_tokens {
            assert!(token.contains(r#""content""#));
        }
    }

    #[test]
    fn tool_call_stream_splits_arguments_into_ten_char_fragments() {
        let output = emit(
            r#"{"function": "f", "arguments": {"key": "0123456789abcde"}}"#,
            true,
            MockDelays::default(),
        );
        let MockOutput::Chunks(chunks) = output else {
            panic!("expected Chunks")
        };

        assert!(chunks[1].data.contains("call_mock_"));
        assert!(chunks.last().unwrap().data == "data: [DONE]\n\n");

        let penultimate = &chunks[chunks.len() - 2];
        assert!(penultimate.data.contains("tool_calls"));
    }

    #[test]
    fn non_streaming_text_produces_single_chat_completion_object() {
        let output = emit("hi", false, MockDelays::default());
        match output {
            MockOutput::Json { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body["object"], "chat.completion");
                assert_eq!(body["choices"][0]["message"]["content"], "hi");
            }
            other => panic!("expected Json, got {other:?}"),
        }
    }

    #[test]
    fn non_streaming_tool_call_has_null_content() {
        let output = emit(r#"{"function": "f"}"#, false, MockDelays::default());
        match output {
            MockOutput::Json { body, .. } => {
                let message = &body["choices"][0]["message"];
                assert_eq!(message["content"], Value::Null);
                assert_eq!(message["tool_calls"][0]["function"]["name"], "f");
            }
            other => panic!("expected Json, got {other:?}"),
        }
    }
}
