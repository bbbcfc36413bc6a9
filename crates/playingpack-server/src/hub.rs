//! The notification hub: a persistent, full-duplex `GET /ws` channel to
//! operator UIs. On connect it replays a snapshot of every live
//! session, then forwards each subsequent `request_update`. Inbound
//! `point1_action`/`point2_action` messages are dispatched to the
//! broker; `ping` is answered with a no-op `pong`.
//!
//! Grounded in the split-sink/outbound-forwarder-task shape used for
//! WebSocket fan-out elsewhere in the corpus: the socket is split once,
//! a dedicated task owns the write half and drains an mpsc channel fed
//! both by the initial snapshot and by the broker subscription, while
//! the read half stays on the connection task dispatching inbound
//! frames. Listener errors (a slow or gone client) are swallowed rather
//! than propagated.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::StreamExt;
use futures::SinkExt;
use playingpack_broker::SessionBroker;
use playingpack_core::{Point1Action, Point2Action, Session};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let broker = state.engine.broker().clone();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();

    for session in broker.list() {
        let _ = out_tx.send(session_update_message(&session));
    }

    let mut updates = broker.subscribe();
    let forward_tx = out_tx.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(session) = updates.recv().await {
            if forward_tx.send(session_update_message(&session)).is_err() {
                break;
            }
        }
    });

    let send_task = tokio::spawn(forward_to_socket(sink, out_rx));

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_inbound(&text, &broker, &out_tx),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    forward_task.abort();
    send_task.abort();
}

async fn forward_to_socket(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        if sink.send(message).await.is_err() {
            break;
        }
    }
}

fn session_update_message(session: &Session) -> Message {
    let payload = json!({ "type": "request_update", "session": session });
    Message::Text(payload.to_string().into())
}

/// Dispatch one inbound text frame. Unknown message types, and
/// messages that fail to parse, are ignored per spec (`§4.8`:
/// "Unknown messages are ignored").
fn handle_inbound(text: &str, broker: &SessionBroker, out_tx: &mpsc::UnboundedSender<Message>) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return;
    };

    match value.get("type").and_then(Value::as_str) {
        Some("ping") => {
            let _ = out_tx.send(Message::Text(json!({ "type": "pong" }).to_string().into()));
        }
        Some("point1_action") => {
            if let (Some(id), Some(action)) = (request_id_of(&value), point1_action_of(&value)) {
                broker.resolve_point1(id, action);
            }
        }
        Some("point2_action") => {
            if let (Some(id), Some(action)) = (request_id_of(&value), point2_action_of(&value)) {
                broker.resolve_point2(id, action);
            }
        }
        _ => {}
    }
}

fn request_id_of(value: &Value) -> Option<Uuid> {
    value.get("requestId").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}

fn point1_action_of(value: &Value) -> Option<Point1Action> {
    serde_json::from_value(value.get("action")?.clone()).ok()
}

fn point2_action_of(value: &Value) -> Option<Point2Action> {
    serde_json::from_value(value.get("action")?.clone()).ok()
}
