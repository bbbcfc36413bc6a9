//! Shared types for the request lifecycle: sessions, tool calls, and
//! process-wide settings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cache mode, one of the three operator-controlled settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    Off,
    Read,
    ReadWrite,
}

impl Default for CacheMode {
    fn default() -> Self {
        CacheMode::ReadWrite
    }
}

/// Process-wide, hot-swappable settings. Readers take a snapshot per
/// request rather than holding a live reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub cache: CacheMode,
    pub intervene: bool,
    pub upstream: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheMode::ReadWrite,
            intervene: true,
            upstream: "https://api.openai.com".to_string(),
        }
    }
}

/// Where the emitted bytes for a session ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Llm,
    Cache,
    Mock,
}

/// Lifecycle state of a session. A session may never transition out of
/// `Complete` once entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Processing,
    Reviewing,
    Complete,
}

/// A tool call reconstructed from streaming deltas. `arguments` is the
/// raw string accumulated across deltas; the core never parses it as
/// JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// Read-only snapshot of the interpreted request fields, taken at
/// session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub model: Option<String>,
    pub messages: serde_json::Value,
    pub stream: bool,
    pub tools: Option<serde_json::Value>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub raw_body: serde_json::Value,
}

impl RequestSnapshot {
    pub fn from_body(body: &serde_json::Value) -> Self {
        Self {
            model: body.get("model").and_then(|v| v.as_str()).map(str::to_string),
            messages: body.get("messages").cloned().unwrap_or(serde_json::Value::Null),
            stream: body.get("stream").and_then(|v| v.as_bool()).unwrap_or(true),
            tools: body.get("tools").cloned(),
            temperature: body.get("temperature").and_then(|v| v.as_f64()),
            max_tokens: body.get("max_tokens").and_then(|v| v.as_u64()),
            raw_body: body.clone(),
        }
    }
}

/// The assembled, buffered response once acquired (from cache, the
/// upstream, or the mock generator).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionResponse {
    pub status: u16,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<serde_json::Value>,
}

/// One session per live request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub processing_started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub request: RequestSnapshot,
    pub fingerprint: String,
    pub cache_available: bool,
    pub response_source: Option<ResponseSource>,
    pub response: Option<SessionResponse>,
    pub error: Option<String>,
}

impl Session {
    pub fn new(id: Uuid, request: RequestSnapshot, fingerprint: String, intervene: bool) -> Self {
        Self {
            id,
            state: if intervene {
                SessionState::Pending
            } else {
                SessionState::Processing
            },
            created_at: chrono::Utc::now(),
            processing_started_at: if intervene { None } else { Some(chrono::Utc::now()) },
            completed_at: None,
            request,
            fingerprint,
            cache_available: false,
            response_source: None,
            response: None,
            error: None,
        }
    }
}

/// Point 1 action: resolves the suspension after cache lookup, before
/// response acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Point1Action {
    Llm,
    Cache,
    Mock { content: String },
}

/// Point 2 action: resolves the suspension after the response buffer is
/// ready, before emission to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Point2Action {
    Return,
    Modify { content: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_default_matches_spec() {
        let s = Settings::default();
        assert_eq!(s.cache, CacheMode::ReadWrite);
        assert!(s.intervene);
        assert_eq!(s.upstream, "https://api.openai.com");
    }

    #[test]
    fn new_session_state_depends_on_intervene() {
        let req = RequestSnapshot::from_body(&json!({"model": "gpt-4", "messages": []}));
        let s1 = Session::new(Uuid::new_v4(), req.clone(), "abc".into(), true);
        assert_eq!(s1.state, SessionState::Pending);
        assert!(s1.processing_started_at.is_none());

        let s2 = Session::new(Uuid::new_v4(), req, "abc".into(), false);
        assert_eq!(s2.state, SessionState::Processing);
        assert!(s2.processing_started_at.is_some());
    }

    #[test]
    fn request_snapshot_defaults_stream_true() {
        let req = RequestSnapshot::from_body(&json!({"model": "gpt-4", "messages": []}));
        assert!(req.stream);
    }

    #[test]
    fn request_snapshot_honors_explicit_stream_false() {
        let req = RequestSnapshot::from_body(&json!({"model": "gpt-4", "messages": [], "stream": false}));
        assert!(!req.stream);
    }

    #[test]
    fn point1_action_roundtrips_through_json() {
        let action = Point1Action::Mock { content: "hello".into() };
        let json = serde_json::to_string(&action).unwrap();
        let back: Point1Action = serde_json::from_str(&json).unwrap();
        match back {
            Point1Action::Mock { content } => assert_eq!(content, "hello"),
            _ => panic!("wrong variant"),
        }
    }
}
