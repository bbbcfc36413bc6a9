//! End-to-end lifecycle tests: fingerprint → acquire → frame, against a
//! wiremock upstream and a real on-disk cache, mirroring the style of
//! `lunaroute-egress`'s wiremock integration tests but exercising the
//! full `LifecycleEngine` instead of just the HTTP client.

use std::sync::Arc;

use http::HeaderMap;
use playingpack_broker::SessionBroker;
use playingpack_cache::CacheStore;
use playingpack_core::{CacheMode, ResponseSource, Settings, SettingsStore};
use playingpack_egress::UpstreamClient;
use playingpack_engine::{EngineOutcome, LifecycleEngine};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(settings: Settings, cache_dir: &TempDir) -> LifecycleEngine {
    let broker = Arc::new(SessionBroker::new(100));
    let cache = CacheStore::new(cache_dir.path());
    let upstream = UpstreamClient::new().unwrap();
    let settings = Arc::new(SettingsStore::new(settings));
    LifecycleEngine::new(broker, cache, upstream, settings)
}

#[tokio::test]
async fn cold_cache_forwards_to_upstream_and_then_populates_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "hi there" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = Settings { cache: CacheMode::ReadWrite, intervene: false, upstream: server.uri() };
    let engine = engine(settings, &dir);

    let body = json!({
        "model": "gpt-4",
        "stream": false,
        "messages": [{ "role": "user", "content": "hello" }]
    });

    let first = engine.run_chat_completion(Uuid::new_v4(), HeaderMap::new(), body.clone()).await;
    match first {
        EngineOutcome::Json { status, body, cached, mocked } => {
            assert_eq!(status, 200);
            assert_eq!(body["choices"][0]["message"]["content"], "hi there");
            assert!(!cached);
            assert!(!mocked);
        }
        EngineOutcome::Sse { .. } => panic!("expected a JSON outcome for stream: false"),
    }

    // second identical request hits the freshly-written cache, not the upstream again.
    let second = engine.run_chat_completion(Uuid::new_v4(), HeaderMap::new(), body).await;
    match second {
        EngineOutcome::Json { status, body, cached, .. } => {
            assert_eq!(status, 200);
            assert_eq!(body["choices"][0]["message"]["content"], "hi there");
            assert!(cached);
        }
        EngineOutcome::Sse { .. } => panic!("expected a JSON outcome for stream: false"),
    }
}

#[tokio::test]
async fn read_only_cache_miss_is_reported_as_cache_not_found() {
    let dir = TempDir::new().unwrap();
    let settings =
        Settings { cache: CacheMode::Read, intervene: false, upstream: "http://unused.invalid".to_string() };
    let engine = engine(settings, &dir);

    let body = json!({
        "model": "gpt-4",
        "stream": false,
        "messages": [{ "role": "user", "content": "never recorded" }]
    });

    let outcome = engine.run_chat_completion(Uuid::new_v4(), HeaderMap::new(), body).await;
    match outcome {
        EngineOutcome::Json { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body["error"]["type"], "cache_not_found");
        }
        EngineOutcome::Sse { .. } => panic!("expected a JSON error outcome"),
    }
}

#[tokio::test]
async fn streaming_request_assembles_tool_call_deltas_into_the_session() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"lookup\",\"arguments\":\"\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"q\\\":\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"42}\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = Settings { cache: CacheMode::Off, intervene: false, upstream: server.uri() };
    let broker = Arc::new(SessionBroker::new(100));
    let cache = CacheStore::new(dir.path());
    let upstream = UpstreamClient::new().unwrap();
    let settings_store = Arc::new(SettingsStore::new(settings));
    let engine = LifecycleEngine::new(broker.clone(), cache, upstream, settings_store);

    let id = Uuid::new_v4();
    let body = json!({
        "model": "gpt-4",
        "stream": true,
        "messages": [{ "role": "user", "content": "what's the weather" }]
    });

    let outcome = engine.run_chat_completion(id, HeaderMap::new(), body).await;
    assert!(matches!(outcome, EngineOutcome::Sse { .. }));

    let session = broker.get(id).expect("session recorded");
    assert_eq!(session.response_source, Some(ResponseSource::Llm));
    let response = session.response.expect("response recorded on the session");
    assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    let tool_call = response.tool_calls.first().expect("one tool call");
    assert_eq!(tool_call.name.as_deref(), Some("lookup"));
    assert_eq!(tool_call.arguments, "{\"q\":42}");
}

#[tokio::test]
async fn error_mock_to_a_streaming_caller_is_still_a_400_json_body() {
    let server = MockServer::start().await;

    let dir = TempDir::new().unwrap();
    let broker = Arc::new(SessionBroker::new(100));
    let cache = CacheStore::new(dir.path());
    let upstream = UpstreamClient::new().unwrap();
    let settings = Arc::new(SettingsStore::new(Settings {
        cache: CacheMode::Off,
        intervene: true,
        upstream: server.uri(),
    }));
    let engine = LifecycleEngine::new(broker.clone(), cache, upstream, settings);

    let id = Uuid::new_v4();
    let body = json!({
        "model": "gpt-4",
        "stream": true,
        "messages": [{ "role": "user", "content": "hi" }]
    });

    let run = tokio::spawn({
        let engine = Arc::new(engine);
        let engine2 = engine.clone();
        async move { (engine2.run_chat_completion(id, HeaderMap::new(), body).await, engine) }
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(broker.resolve_point1(
        id,
        playingpack_core::Point1Action::Mock { content: "ERROR: bad request".to_string() }
    ));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(broker.resolve_point2(id, playingpack_core::Point2Action::Return));

    let (outcome, _engine) = run.await.unwrap();
    match outcome {
        EngineOutcome::Json { status, body, mocked, .. } => {
            assert_eq!(status, 400);
            assert_eq!(body["error"]["message"], "bad request");
            assert!(mocked);
        }
        EngineOutcome::Sse { .. } => panic!("expected a JSON error outcome, not a re-chunked SSE stream"),
    }
}

#[tokio::test]
async fn modify_at_point2_replaces_rather_than_appends_to_the_session_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-orig",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "original answer" },
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let broker = Arc::new(SessionBroker::new(100));
    let cache = CacheStore::new(dir.path());
    let upstream = UpstreamClient::new().unwrap();
    let settings = Arc::new(SettingsStore::new(Settings {
        cache: CacheMode::Off,
        intervene: true,
        upstream: server.uri(),
    }));
    let engine = LifecycleEngine::new(broker.clone(), cache, upstream, settings);

    let id = Uuid::new_v4();
    let body = json!({
        "model": "gpt-4",
        "stream": false,
        "messages": [{ "role": "user", "content": "hi" }]
    });

    let run = tokio::spawn({
        let engine = Arc::new(engine);
        let engine2 = engine.clone();
        async move { (engine2.run_chat_completion(id, HeaderMap::new(), body).await, engine) }
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(broker.resolve_point1(id, playingpack_core::Point1Action::Llm));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(broker.resolve_point2(
        id,
        playingpack_core::Point2Action::Modify { content: "replaced".to_string() }
    ));

    let (outcome, _engine) = run.await.unwrap();
    match outcome {
        EngineOutcome::Json { body, .. } => {
            assert_eq!(body["choices"][0]["message"]["content"], "replaced");
        }
        EngineOutcome::Sse { .. } => panic!("expected a JSON outcome for stream: false"),
    }

    let session = broker.get(id).expect("session recorded");
    let response = session.response.expect("response recorded");
    assert_eq!(response.content, "replaced", "must not be \"original answer\" + \"replaced\"");
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn mocked_response_never_touches_the_upstream() {
    let server = MockServer::start().await;
    // No mock mounted: any request would fail the wiremock assertion at drop time
    // if one were made. We additionally assert `mocked` is set on the outcome.

    let dir = TempDir::new().unwrap();
    let broker = Arc::new(SessionBroker::new(100));
    let cache = CacheStore::new(dir.path());
    let upstream = UpstreamClient::new().unwrap();
    let settings = Arc::new(SettingsStore::new(Settings {
        cache: CacheMode::Off,
        intervene: true,
        upstream: server.uri(),
    }));
    let engine = LifecycleEngine::new(broker.clone(), cache, upstream, settings);

    let id = Uuid::new_v4();
    let body = json!({
        "model": "gpt-4",
        "stream": false,
        "messages": [{ "role": "user", "content": "hi" }]
    });

    let run = tokio::spawn({
        let engine = Arc::new(engine);
        let engine2 = engine.clone();
        async move { (engine2.run_chat_completion(id, HeaderMap::new(), body).await, engine) }
    });

    // give the session a moment to reach `pending` before resolving point 1.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(broker.resolve_point1(
        id,
        playingpack_core::Point1Action::Mock { content: "mocked answer".to_string() }
    ));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(broker.resolve_point2(id, playingpack_core::Point2Action::Return));

    let (outcome, _engine) = run.await.unwrap();
    match outcome {
        EngineOutcome::Json { body, mocked, .. } => {
            assert!(mocked);
            assert_eq!(body["choices"][0]["message"]["content"], "mocked answer");
        }
        EngineOutcome::Sse { .. } => panic!("expected a JSON outcome for stream: false"),
    }
}
