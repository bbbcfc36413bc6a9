//! `SessionBroker`: the shared owner of `sessions` and `subscribers`.
//!
//! All mutation goes through `&self` methods guarded by a single
//! `std::sync::Mutex` — no method holds the lock across an `.await`, so a
//! plain blocking mutex is sufficient. The two decision points are one-shot
//! `tokio::sync::oneshot` channels stashed in a side table keyed by
//! session id; `await_point1`/`await_point2` register the receiving half
//! and await it, `resolve_point1`/`resolve_point2` take the sending half
//! out of the table and fire it.

use std::collections::HashMap;
use std::sync::Mutex;

use playingpack_core::{
    Point1Action, Point2Action, RequestSnapshot, ResponseSource, Session, SessionState,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Error returned by `await_point1`/`await_point2` when the matching
/// `resolve_pointN` is never reached (e.g. the broker is dropped).
#[derive(Debug, Error)]
pub enum PointAwaitError {
    #[error("session {0} was never resolved")]
    Cancelled(Uuid),
}

struct Inner {
    sessions: HashMap<Uuid, Session>,
    /// Insertion order, oldest first — used by the reaper to decide which
    /// completed sessions to evict first.
    order: Vec<Uuid>,
    subscribers: Vec<mpsc::UnboundedSender<Session>>,
    point1_pending: HashMap<Uuid, oneshot::Sender<Point1Action>>,
    point2_pending: HashMap<Uuid, oneshot::Sender<Point2Action>>,
}

/// Owns every live session and coordinates the two suspension points.
/// Cheap to clone: wrap in an `Arc` at the call site (the broker itself
/// holds only a `Mutex`, no interior `Arc`, so server wiring controls
/// sharing explicitly).
pub struct SessionBroker {
    inner: Mutex<Inner>,
    max_sessions: usize,
}

impl SessionBroker {
    /// `max_sessions` bounds how many completed sessions the reaper
    /// keeps around; the oldest completed session is evicted first
    /// once the total exceeds this limit.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                order: Vec::new(),
                subscribers: Vec::new(),
                point1_pending: HashMap::new(),
                point2_pending: HashMap::new(),
            }),
            max_sessions,
        }
    }

    /// Create a new session from an inbound request body. State starts
    /// at `pending` when `intervene` is on, else `processing`.
    pub fn create(&self, id: Uuid, body: &Value, fingerprint: String, intervene: bool) -> Session {
        let request = RequestSnapshot::from_body(body);
        let session = Session::new(id, request, fingerprint, intervene);

        let mut inner = self.inner.lock().unwrap();
        inner.order.push(id);
        inner.sessions.insert(id, session.clone());
        drop(inner);

        self.publish(session.clone());
        session
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.lock().unwrap().sessions.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Session> {
        let inner = self.inner.lock().unwrap();
        inner.order.iter().filter_map(|id| inner.sessions.get(id).cloned()).collect()
    }

    pub fn set_cache_available(&self, id: Uuid, available: bool) {
        self.mutate(id, |s| s.cache_available = available);
    }

    pub fn set_processing(&self, id: Uuid) {
        self.mutate(id, |s| {
            s.state = SessionState::Processing;
            s.processing_started_at.get_or_insert_with(chrono::Utc::now);
        });
    }

    pub fn set_reviewing(&self, id: Uuid) {
        self.mutate(id, |s| s.state = SessionState::Reviewing);
    }

    pub fn set_response_source(&self, id: Uuid, source: ResponseSource) {
        self.mutate(id, |s| s.response_source = Some(source));
    }

    /// Ensure a response buffer exists and set its HTTP status.
    pub fn set_response_status(&self, id: Uuid, status: u16) {
        self.mutate(id, |s| s.response_mut().status = status);
    }

    /// Append a fragment of assistant text content. Deliberately does
    /// *not* publish, to avoid flooding subscribers with a notification
    /// per token; consumers that want mid-stream text poll the decision
    /// API instead.
    pub fn append_content(&self, id: Uuid, fragment: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.get_mut(&id) {
            session.response_mut().content.push_str(fragment);
        }
    }

    /// Upsert the tool call at `call.index` to the given (already fully
    /// accumulated) state. The SSE parser owns fragment accumulation;
    /// the broker just mirrors its latest view, so this replaces rather
    /// than appends.
    pub fn set_tool_call(&self, id: Uuid, call: playingpack_core::ToolCall) {
        self.mutate(id, |s| {
            let response = s.response_mut();
            match response.tool_calls.iter_mut().find(|c| c.index == call.index) {
                Some(existing) => *existing = call,
                None => response.tool_calls.push(call),
            }
        });
    }

    pub fn set_finish_reason(&self, id: Uuid, reason: String) {
        self.mutate(id, |s| {
            let response = s.response_mut();
            if response.finish_reason.is_none() {
                response.finish_reason = Some(reason);
            }
        });
    }

    pub fn set_usage(&self, id: Uuid, usage: Value) {
        self.mutate(id, |s| {
            let response = s.response_mut();
            if response.usage.is_none() {
                response.usage = Some(usage);
            }
        });
    }

    /// Discard the accumulated response buffer (content, tool calls,
    /// finish reason, usage) so a fresh acquisition — e.g. the point-2
    /// `Modify` re-synthesis — starts from a clean slate instead of
    /// appending onto what the first acquisition already buffered.
    pub fn reset_response(&self, id: Uuid) {
        self.mutate(id, |s| s.response = Some(Default::default()));
    }

    /// Mark the session errored. An errored session is always also
    /// completed; there is no error disposition that leaves a session
    /// open afterwards.
    pub fn error(&self, id: Uuid, message: impl Into<String>) {
        self.mutate(id, |s| {
            s.error = Some(message.into());
            s.state = SessionState::Complete;
            s.completed_at.get_or_insert_with(chrono::Utc::now);
        });
    }

    /// Mark the session complete. No-op (but still idempotent) if
    /// already complete — a session may never leave `complete` once
    /// entered.
    pub fn complete(&self, id: Uuid) {
        self.mutate(id, |s| {
            if s.state != SessionState::Complete {
                s.state = SessionState::Complete;
                s.completed_at = Some(chrono::Utc::now());
            }
        });
    }

    fn mutate(&self, id: Uuid, f: impl FnOnce(&mut Session)) {
        let updated = {
            let mut inner = self.inner.lock().unwrap();
            let Some(session) = inner.sessions.get_mut(&id) else {
                return;
            };
            f(session);
            session.clone()
        };
        self.publish(updated);
    }

    fn publish(&self, session: Session) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|tx| tx.send(session.clone()).is_ok());
    }

    /// Subscribe to `request_update` events. The returned receiver is
    /// unsubscribed implicitly by dropping it — the next publish prunes
    /// dead senders.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Session> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Catch the subscriber up on current state immediately so a late
        // joiner doesn't have to wait for the next transition.
        for session in self.list() {
            let _ = tx.send(session);
        }
        self.inner.lock().unwrap().subscribers.push(tx);
        rx
    }

    /// Suspend until `resolve_point1` is called for `id`. Registering a
    /// second awaiter for a session already awaiting point 1 is a
    /// programmer error and panics in debug builds.
    pub async fn await_point1(&self, id: Uuid) -> Result<Point1Action, PointAwaitError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            let previous = inner.point1_pending.insert(id, tx);
            debug_assert!(previous.is_none(), "point 1 already awaited for {id}");
        }
        rx.await.map_err(|_| PointAwaitError::Cancelled(id))
    }

    pub async fn await_point2(&self, id: Uuid) -> Result<Point2Action, PointAwaitError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            let previous = inner.point2_pending.insert(id, tx);
            debug_assert!(previous.is_none(), "point 2 already awaited for {id}");
        }
        rx.await.map_err(|_| PointAwaitError::Cancelled(id))
    }

    /// Resolve a pending point 1 suspension. The accompanying state
    /// transition (→ processing) is applied before the awaiter wakes.
    /// Returns `false` with no state change if nothing was pending.
    pub fn resolve_point1(&self, id: Uuid, action: Point1Action) -> bool {
        let sender = {
            let mut inner = self.inner.lock().unwrap();
            inner.point1_pending.remove(&id)
        };
        let Some(sender) = sender else { return false };
        self.set_processing(id);
        let _ = sender.send(action);
        true
    }

    /// Resolve a pending point 2 suspension. Point 2 conceptually
    /// consumes the `reviewing` state on the way back to `processing`
    /// before the engine emits the buffer and calls `complete`.
    pub fn resolve_point2(&self, id: Uuid, action: Point2Action) -> bool {
        let sender = {
            let mut inner = self.inner.lock().unwrap();
            inner.point2_pending.remove(&id)
        };
        let Some(sender) = sender else { return false };
        self.set_processing(id);
        let _ = sender.send(action);
        true
    }

    /// Evict completed sessions, oldest first, until at most
    /// `max_sessions` remain. Used by the background reaper.
    pub fn reap(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.sessions.len() <= self.max_sessions {
            return;
        }
        let mut i = 0;
        while inner.sessions.len() > self.max_sessions && i < inner.order.len() {
            let id = inner.order[i];
            let is_complete = inner
                .sessions
                .get(&id)
                .map(|s| s.state == SessionState::Complete)
                .unwrap_or(true);
            if is_complete {
                inner.sessions.remove(&id);
                inner.order.remove(i);
            } else {
                i += 1;
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }
}

trait SessionResponseExt {
    fn response_mut(&mut self) -> &mut playingpack_core::SessionResponse;
}

impl SessionResponseExt for Session {
    fn response_mut(&mut self) -> &mut playingpack_core::SessionResponse {
        self.response.get_or_insert_with(Default::default)
    }
}
