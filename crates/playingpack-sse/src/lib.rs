//! Streaming parser for OpenAI chat-completions chunk-delta payloads.
//!
//! The parser is handed already-framed SSE payloads (the `data: ` prefix
//! and trailing blank line stripped) one at a time via
//! [`SseParser::process_payload`] and accumulates content, tool calls,
//! finish reason, and usage as it goes. It never stops on malformed
//! input — a bad payload is reported through the returned [`SseEvent`]
//! and the parser keeps accepting further payloads.

use playingpack_core::ToolCall;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// What a single call to [`SseParser::process_payload`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A fragment of assistant text content.
    Content(String),
    /// The tool call at this index gained a new fragment.
    ToolCallUpdate(u32),
    /// The terminal finish reason (fires once).
    FinishReason(String),
    /// A usage object was captured (fires once).
    Usage,
    /// The `[DONE]` sentinel.
    Done,
    /// The payload was not valid JSON; parsing continues regardless.
    Malformed(String),
    /// A well-formed chunk that carried nothing new (e.g. a bare role
    /// delta, or a duplicate finish reason/usage).
    Unchanged,
}

/// Accumulated state of one OpenAI chat-completions stream.
#[derive(Debug, Default)]
pub struct SseParser {
    content: String,
    tool_calls: BTreeMap<u32, ToolCall>,
    finish_reason: Option<String>,
    usage: Option<Value>,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one already-unframed payload (`[DONE]` or a JSON chunk).
    pub fn process_payload(&mut self, payload: &str) -> SseEvent {
        let payload = payload.trim();
        if payload.is_empty() {
            return SseEvent::Unchanged;
        }
        if payload == "[DONE]" {
            self.done = true;
            return SseEvent::Done;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "malformed SSE payload, continuing parse");
                return SseEvent::Malformed(err.to_string());
            }
        };

        self.apply_chunk(&value)
    }

    /// Convenience entry point for replay paths that already hold the
    /// full list of payloads in memory; returns the fully-accumulated
    /// parser.
    pub fn parse_complete<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = Self::new();
        for payload in payloads {
            parser.process_payload(payload.as_ref());
        }
        parser
    }

    fn apply_chunk(&mut self, value: &Value) -> SseEvent {
        let usage_event = self.capture_usage(value);

        let choice = value
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first());

        let Some(choice) = choice else {
            return usage_event;
        };

        let delta = choice.get("delta");

        if let Some(content) = delta
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            self.content.push_str(content);
            return SseEvent::Content(content.to_string());
        }

        if let Some(tool_calls) = delta.and_then(|d| d.get("tool_calls")).and_then(Value::as_array)
        {
            let mut last_index = None;
            for entry in tool_calls {
                if let Some(index) = self.apply_tool_call_delta(entry) {
                    last_index = Some(index);
                }
            }
            if let Some(index) = last_index {
                return SseEvent::ToolCallUpdate(index);
            }
        }

        if let Some(reason) = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .filter(|_| self.finish_reason.is_none())
        {
            self.finish_reason = Some(reason.to_string());
            return SseEvent::FinishReason(reason.to_string());
        }

        usage_event
    }

    fn capture_usage(&mut self, value: &Value) -> SseEvent {
        match value.get("usage").filter(|u| !u.is_null()) {
            Some(usage) if self.usage.is_none() => {
                self.usage = Some(usage.clone());
                SseEvent::Usage
            }
            _ => SseEvent::Unchanged,
        }
    }

    /// Returns the tool-call index touched, if the entry had a valid
    /// numeric `index` field.
    fn apply_tool_call_delta(&mut self, entry: &Value) -> Option<u32> {
        let index = entry.get("index").and_then(Value::as_u64)? as u32;

        let id = entry.get("id").and_then(Value::as_str).map(String::from);
        let function = entry.get("function");
        let name = function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .map(String::from);
        let arguments_fragment = function
            .and_then(|f| f.get("arguments"))
            .and_then(Value::as_str)
            .unwrap_or("");

        let call = self.tool_calls.entry(index).or_insert_with(|| ToolCall {
            index,
            id: None,
            name: None,
            arguments: String::new(),
        });

        if let Some(id) = id {
            call.id = Some(id);
        }
        if let Some(name) = name {
            call.name = Some(name);
        }
        call.arguments.push_str(arguments_fragment);

        Some(index)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls.values().cloned().collect()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn usage(&self) -> Option<&Value> {
        self.usage.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The OpenAI non-streaming response message shape. `content` is
    /// `null` whenever any tool calls were observed.
    pub fn assembled_message(&self) -> Value {
        if self.tool_calls.is_empty() {
            return json!({
                "role": "assistant",
                "content": self.content,
            });
        }

        let tool_calls: Vec<Value> = self
            .tool_calls
            .values()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments,
                    },
                })
            })
            .collect();

        json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": tool_calls,
        })
    }
}
