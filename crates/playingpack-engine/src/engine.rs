//! The lifecycle engine: the per-request state machine that ties the
//! cache, upstream client, SSE parser, mock generator, and broker
//! together.

use std::sync::Arc;

use playingpack_broker::SessionBroker;
use playingpack_cache::CacheStore;
use playingpack_core::{CacheMode, Point1Action, Point2Action, ResponseSource, Settings, SettingsStore};
use playingpack_egress::{ForwardRequest, UpstreamClient};
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use crate::acquire::{acquire_from_cache, acquire_from_llm, acquire_from_mock, cached_request_of, Acquired};
use crate::error::{EngineError, Result};
use crate::framing::{assemble_json_from_sse, is_sse_framed, synthesize_sse_from_json};

/// What the engine produced, ready to be written to the caller. The
/// response's `x-playingpack-*` provenance headers are derived from
/// `cached` / `mocked` at the call site.
pub enum EngineOutcome {
    Sse { chunks: Vec<String>, cached: bool, mocked: bool },
    Json { status: u16, body: Value, cached: bool, mocked: bool },
}

pub struct LifecycleEngine {
    broker: Arc<SessionBroker>,
    cache: CacheStore,
    upstream: UpstreamClient,
    settings: Arc<SettingsStore>,
}

impl LifecycleEngine {
    pub fn new(
        broker: Arc<SessionBroker>,
        cache: CacheStore,
        upstream: UpstreamClient,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self { broker, cache, upstream, settings }
    }

    pub fn broker(&self) -> &Arc<SessionBroker> {
        &self.broker
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Run one `/v1/chat/completions` request to completion. Never
    /// returns an `Err` to the caller — every failure is translated
    /// into a JSON error body and returned as a (status, body)
    /// outcome, with the session marked errored.
    pub async fn run_chat_completion(&self, id: Uuid, headers: http::HeaderMap, body: Value) -> EngineOutcome {
        match self.try_run_chat_completion(id, headers, body).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(session_id = %id, %err, "request failed");
                self.broker.error(id, err.to_string());
                EngineOutcome::Json {
                    status: err.status(),
                    body: serde_json::json!({
                        "error": { "message": err.to_string(), "type": err.error_type() }
                    }),
                    cached: false,
                    mocked: false,
                }
            }
        }
    }

    async fn try_run_chat_completion(&self, id: Uuid, headers: http::HeaderMap, body: Value) -> Result<EngineOutcome> {
        let settings = self.settings.snapshot();
        let wants_streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(true);
        let model = body.get("model").and_then(Value::as_str).map(str::to_string);

        let fingerprint = match playingpack_core::fingerprint::hash(&body) {
            Ok(fp) => fp,
            Err(err) => {
                self.broker.create(id, &body, String::new(), settings.intervene);
                return Err(EngineError::Fingerprint(err));
            }
        };

        self.broker.create(id, &body, fingerprint.clone(), settings.intervene);

        let cache_available =
            settings.cache != CacheMode::Off && self.cache.exists(&fingerprint).await;
        self.broker.set_cache_available(id, cache_available);

        let action = if settings.intervene {
            self.broker.await_point1(id).await?
        } else {
            self.broker.set_processing(id);
            if cache_available {
                Point1Action::Cache
            } else {
                Point1Action::Llm
            }
        };

        let (mut acquired, mut source) = self
            .acquire_response(id, &settings, &headers, &body, wants_streaming, action)
            .await?;

        self.broker.set_response_source(id, source);
        self.broker.set_response_status(id, acquired.status);

        let mut mocked = source == ResponseSource::Mock;

        if settings.intervene {
            self.broker.set_reviewing(id);
            if let Point2Action::Modify { content } = self.broker.await_point2(id).await? {
                self.broker.reset_response(id);
                acquired = acquire_from_mock(&self.broker, id, &content, wants_streaming);
                source = ResponseSource::Mock;
                mocked = true;
                self.broker.set_response_source(id, source);
                self.broker.set_response_status(id, acquired.status);
            }
        }

        let cached = source == ResponseSource::Cache;
        let outcome = self.frame_outcome(acquired, wants_streaming, model.as_deref(), cached, mocked);
        self.broker.complete(id);
        Ok(outcome)
    }

    async fn acquire_response(
        &self,
        id: Uuid,
        settings: &Settings,
        headers: &http::HeaderMap,
        body: &Value,
        wants_streaming: bool,
        action: Point1Action,
    ) -> Result<(Acquired, ResponseSource)> {
        match action {
            Point1Action::Mock { content } => {
                Ok((acquire_from_mock(&self.broker, id, &content, wants_streaming), ResponseSource::Mock))
            }
            Point1Action::Cache => {
                let session = self.broker.get(id);
                let fingerprint = session.map(|s| s.fingerprint).unwrap_or_default();
                match acquire_from_cache(&self.cache, &self.broker, id, &fingerprint).await {
                    Some(acquired) => Ok((acquired, ResponseSource::Cache)),
                    None if settings.cache == CacheMode::Read => Err(EngineError::CacheMiss),
                    None => {
                        warn!(session_id = %id, "point 1 selected cache but no entry exists, falling back to llm");
                        self.acquire_from_llm(id, settings, headers, body).await
                    }
                }
            }
            Point1Action::Llm => self.acquire_from_llm(id, settings, headers, body).await,
        }
    }

    async fn acquire_from_llm(
        &self,
        id: Uuid,
        settings: &Settings,
        headers: &http::HeaderMap,
        body: &Value,
    ) -> Result<(Acquired, ResponseSource)> {
        let session = self.broker.get(id);
        let fingerprint = session.map(|s| s.fingerprint).unwrap_or_default();
        let cache_writer = (settings.cache == CacheMode::ReadWrite)
            .then(|| self.cache.writer(&fingerprint, cached_request_of(body)));

        let acquired = acquire_from_llm(
            &self.upstream,
            &self.broker,
            id,
            &settings.upstream,
            headers.clone(),
            body.clone(),
            cache_writer,
        )
        .await?;
        Ok((acquired, ResponseSource::Llm))
    }

    fn frame_outcome(
        &self,
        acquired: Acquired,
        wants_streaming: bool,
        model: Option<&str>,
        cached: bool,
        mocked: bool,
    ) -> EngineOutcome {
        let sse_framed = is_sse_framed(&acquired.chunks);
        let is_success = (200..300).contains(&acquired.status);

        match (wants_streaming, sse_framed) {
            (true, true) => EngineOutcome::Sse { chunks: acquired.chunks, cached, mocked },
            // A non-2xx acquisition (e.g. the mock generator's `ERROR:` form) is
            // always a JSON error body, never re-chunked into a 200 SSE stream,
            // even when the caller asked for `stream: true`.
            (true, false) if is_success => {
                let body = acquired.chunks.first().and_then(|c| serde_json::from_str::<Value>(c).ok());
                let chunks = body.as_ref().map(synthesize_sse_from_json).unwrap_or_default();
                EngineOutcome::Sse { chunks, cached, mocked }
            }
            (false, true) => {
                let body = assemble_json_from_sse(&acquired.chunks, model);
                EngineOutcome::Json { status: acquired.status, body, cached, mocked }
            }
            (true, false) | (false, false) => {
                let body = acquired
                    .chunks
                    .first()
                    .and_then(|c| serde_json::from_str::<Value>(c).ok())
                    .unwrap_or(Value::Null);
                EngineOutcome::Json { status: acquired.status, body, cached, mocked }
            }
        }
    }

    /// Transparent passthrough for any other `/v1/*` path. No
    /// buffering, no cache interaction, no session — this is a raw
    /// proxy, not a recorded/replayed request.
    pub async fn passthrough(
        &self,
        method: http::Method,
        path: &str,
        headers: http::HeaderMap,
        body: Option<Value>,
    ) -> Result<(u16, http::HeaderMap, playingpack_egress::ForwardResponse)> {
        let upstream_url = self.settings.snapshot().upstream;
        let response = self
            .upstream
            .forward(ForwardRequest { method, path: path.to_string(), headers, body, upstream_url })
            .await?;
        let status = response.status;
        let mut headers = response.headers.clone();
        headers.remove(http::header::CONTENT_ENCODING);
        headers.remove(http::header::TRANSFER_ENCODING);
        Ok((status, headers, response))
    }
}
