//! The upstream client: forwards a request to the configured upstream,
//! filtering headers to an allow-list and shaping `Accept` and
//! `stream_options` to match the caller's streaming preference.

use crate::error::{EgressError, Result};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;

/// Headers forwarded verbatim from the inbound request; everything
/// else is dropped.
const ALLOWED_HEADERS: &[&str] = &[
    "authorization",
    "content-type",
    "accept",
    "openai-organization",
    "openai-project",
    "user-agent",
];

pub struct ForwardRequest {
    pub method: reqwest::Method,
    pub path: String,
    pub headers: HeaderMap,
    /// `Some` for the chat-completions entry point, where the body is
    /// a JSON object eligible for `stream_options` injection. `None`
    /// for bodyless or non-JSON passthrough requests.
    pub body: Option<Value>,
    pub upstream_url: String,
}

pub struct ForwardResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    pub ok: bool,
}

/// Filter `headers` down to the forwarding allow-list.
pub fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for name in ALLOWED_HEADERS {
        if let Some(value) = headers.get(*name) {
            if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
                filtered.insert(header_name, value.clone());
            }
        }
    }
    filtered
}

/// Whether the body asks for a streaming response (defaults to true,
/// matching upstream convention).
fn wants_streaming(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(true)
}

/// Merge `stream_options.include_usage = true` into a streaming body,
/// preserving any caller-supplied `stream_options` fields.
fn prepare_chat_body(mut body: Value) -> Value {
    if !wants_streaming(&body) {
        return body;
    }

    let Some(obj) = body.as_object_mut() else {
        return body;
    };

    let options = obj
        .entry("stream_options")
        .or_insert_with(|| json!({}));

    if let Some(options) = options.as_object_mut() {
        options
            .entry("include_usage")
            .or_insert(Value::Bool(true));
    }

    body
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Build a client tuned for long-lived streaming responses: idle
    /// connections are recycled before upstream providers close them,
    /// and automatic decompression is disabled so the catch-all path
    /// can forward bytes untouched.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()?;

        Ok(Self { http })
    }

    /// Forward one request. No retries: a network failure propagates
    /// to the caller immediately. A non-2xx upstream status is
    /// returned as `Ok` with `ok: false` — the body is still forwarded
    /// verbatim.
    pub async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse> {
        if request.upstream_url.is_empty() {
            return Err(EgressError::InvalidUrl(request.upstream_url));
        }

        let url = format!(
            "{}{}",
            request.upstream_url.trim_end_matches('/'),
            request.path
        );

        let mut headers = filter_headers(&request.headers);
        let body = request.body.map(prepare_chat_body);
        let streaming = body.as_ref().map(wants_streaming).unwrap_or(false);

        let accept = if streaming {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert(ACCEPT, HeaderValue::from_static(accept));

        let mut builder = self.http.request(request.method, url).headers(headers);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let ok = status.is_success();
        let response_headers = response.headers().clone();
        let body_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>> =
            Box::pin(response.bytes_stream());

        Ok(ForwardResponse {
            status: status.as_u16(),
            headers: response_headers,
            body_stream,
            ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, AUTHORIZATION, COOKIE};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn filter_headers_keeps_only_the_allow_list() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        headers.insert(COOKIE, HeaderValue::from_static("session=abc"));

        let filtered = filter_headers(&headers);
        assert!(filtered.contains_key(AUTHORIZATION));
        assert!(!filtered.contains_key(COOKIE));
    }

    #[test]
    fn prepare_chat_body_merges_include_usage_preserving_caller_options() {
        let body = json!({"stream": true, "stream_options": {"foo": 1}});
        let prepared = prepare_chat_body(body);
        assert_eq!(prepared["stream_options"]["foo"], 1);
        assert_eq!(prepared["stream_options"]["include_usage"], true);
    }

    #[test]
    fn prepare_chat_body_adds_stream_options_when_absent() {
        let body = json!({"stream": true});
        let prepared = prepare_chat_body(body);
        assert_eq!(prepared["stream_options"]["include_usage"], true);
    }

    #[test]
    fn prepare_chat_body_leaves_non_streaming_body_untouched() {
        let body = json!({"stream": false});
        let prepared = prepare_chat_body(body);
        assert!(prepared.get("stream_options").is_none());
    }

    #[tokio::test]
    async fn forward_returns_upstream_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_json(json!({"model": "gpt-4", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = UpstreamClient::new().unwrap();
        let response = client
            .forward(ForwardRequest {
                method: reqwest::Method::POST,
                path: "/v1/chat/completions".to_string(),
                headers: HeaderMap::new(),
                body: Some(json!({"model": "gpt-4", "stream": false})),
                upstream_url: server.uri(),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.ok);
    }

    #[tokio::test]
    async fn forward_propagates_network_failure() {
        let client = UpstreamClient::new().unwrap();
        let result = client
            .forward(ForwardRequest {
                method: reqwest::Method::POST,
                path: "/v1/chat/completions".to_string(),
                headers: HeaderMap::new(),
                body: Some(json!({"model": "gpt-4"})),
                upstream_url: "http://127.0.0.1:1".to_string(),
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn forward_preserves_non_2xx_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "rate limited"})))
            .mount(&server)
            .await;

        let client = UpstreamClient::new().unwrap();
        let response = client
            .forward(ForwardRequest {
                method: reqwest::Method::POST,
                path: "/v1/chat/completions".to_string(),
                headers: HeaderMap::new(),
                body: Some(json!({"model": "gpt-4", "stream": false})),
                upstream_url: server.uri(),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert!(!response.ok);
    }
}
