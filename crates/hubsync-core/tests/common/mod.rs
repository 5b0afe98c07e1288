// In-process hub double for client integration tests.
//
// Speaks the hub's WebSocket protocol on a loopback port: handshake,
// `subscribe_events`, `get_states`, `call_service`, `ping`, forecast
// subscriptions, plus a few `test/*` commands for timing scenarios.
#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hubsync_core::{HubClient, HubConfig, ReconnectConfig, StatusChange, Subscription};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub const TOKEN: &str = "tok";

enum Command {
    Send(Value),
    Close,
}

#[derive(Default)]
struct HubState {
    token: String,
    states: Mutex<Vec<Value>>,
    received: Mutex<Vec<Value>>,
    connections: AtomicUsize,
    current: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    stalled_get_states: AtomicUsize,
    batched_with_states: Mutex<Vec<Value>>,
    held: Mutex<Vec<Value>>,
}

pub struct MockHub {
    addr: SocketAddr,
    state: Arc<HubState>,
    task: JoinHandle<()>,
}

impl MockHub {
    pub async fn start(states: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(HubState {
            token: TOKEN.into(),
            states: Mutex::new(states),
            ..HubState::default()
        });
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&state)));
        Self { addr, state, task }
    }

    pub fn url(&self) -> url::Url {
        format!("ws://{}/api/websocket", self.addr).parse().unwrap()
    }

    /// Client config with fast reconnects.
    pub fn config(&self, token: &str) -> HubConfig {
        HubConfig::new(self.url(), Some(SecretString::from(token.to_owned())))
            .with_reconnect(fast_reconnect(5))
    }

    pub fn client(&self) -> HubClient {
        HubClient::new(self.config(TOKEN))
    }

    pub fn set_states(&self, states: Vec<Value>) {
        *self.state.states.lock().unwrap() = states;
    }

    /// Leave the next `n` `get_states` requests unanswered.
    pub fn stall_get_states(&self, n: usize) {
        self.state.stalled_get_states.store(n, Ordering::SeqCst);
    }

    /// Send `frames` in the same WebSocket message as the next `get_states`
    /// result, right behind it.
    pub fn batch_with_next_states(&self, frames: Vec<Value>) {
        *self.state.batched_with_states.lock().unwrap() = frames;
    }

    pub fn push(&self, frame: Value) {
        if let Some(tx) = self.state.current.lock().unwrap().as_ref() {
            let _ = tx.send(Command::Send(frame));
        }
    }

    pub fn push_state_change(&self, entity_id: &str, new_state: Value) {
        self.push(state_changed(entity_id, new_state));
    }

    /// Send a close frame on the live connection.
    pub fn close_connection(&self) {
        if let Some(tx) = self.state.current.lock().unwrap().take() {
            let _ = tx.send(Command::Close);
        }
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_of_type(&self, ty: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|f| f["type"] == ty)
            .collect()
    }
}

impl Drop for MockHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn fast_reconnect(max_retries: u32) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_retries,
    }
}

pub fn state_changed(entity_id: &str, new_state: Value) -> Value {
    json!({
        "id": 1,
        "type": "event",
        "event": {
            "event_type": "state_changed",
            "data": { "entity_id": entity_id, "new_state": new_state, "old_state": null }
        }
    })
}

pub fn entity(entity_id: &str, state: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": { "friendly_name": entity_id },
        "last_changed": "2026-02-10T12:00:00+00:00",
        "last_updated": "2026-02-10T12:00:00+00:00",
        "context": { "id": "01HX", "parent_id": null, "user_id": null }
    })
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

/// Capture every phase transition the client broadcasts.
pub fn record_phases(client: &HubClient) -> (Arc<Mutex<Vec<StatusChange>>>, Subscription) {
    let seen: Arc<Mutex<Vec<StatusChange>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let sub = client.on_connection_change(move |change| sink.lock().unwrap().push(change.clone()));
    (seen, sub)
}

// ── Server side ──────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, state: Arc<HubState>) {
    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(serve(stream, Arc::clone(&state)));
    }
}

async fn serve(stream: TcpStream, state: Arc<HubState>) {
    let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    *state.current.lock().unwrap() = Some(tx.clone());
    let _ = tx.send(Command::Send(
        json!({ "type": "auth_required", "ha_version": "2026.2.0" }),
    ));

    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(Command::Send(frame)) => {
                        if write.send(Message::text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                        state.received.lock().unwrap().push(frame.clone());
                        let (replies, close) = respond(&state, &frame);
                        for reply in replies {
                            let _ = tx.send(Command::Send(reply));
                        }
                        if close {
                            let _ = tx.send(Command::Close);
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

fn result(id: Option<u64>, payload: Value) -> Value {
    json!({ "id": id, "type": "result", "success": true, "result": payload })
}

fn failure(id: Option<u64>, code: &str, message: &str) -> Value {
    json!({
        "id": id,
        "type": "result",
        "success": false,
        "error": { "code": code, "message": message }
    })
}

fn respond(state: &HubState, frame: &Value) -> (Vec<Value>, bool) {
    let id = frame.get("id").and_then(Value::as_u64);
    let replies = match frame["type"].as_str().unwrap_or_default() {
        "auth" => {
            if frame["access_token"] == state.token.as_str() {
                vec![json!({ "type": "auth_ok", "ha_version": "2026.2.0" })]
            } else {
                let reject = json!({ "type": "auth_invalid", "message": "Invalid access token" });
                return (vec![reject], true);
            }
        }
        "subscribe_events" | "unsubscribe_events" => vec![result(id, Value::Null)],
        "get_states" => {
            let stalled = state
                .stalled_get_states
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if stalled {
                vec![]
            } else {
                let states = state.states.lock().unwrap().clone();
                let reply = result(id, Value::Array(states));
                let batched: Vec<Value> =
                    state.batched_with_states.lock().unwrap().drain(..).collect();
                if batched.is_empty() {
                    vec![reply]
                } else {
                    let mut frame = vec![reply];
                    frame.extend(batched);
                    vec![Value::Array(frame)]
                }
            }
        }
        "call_service" => {
            if frame["domain"] == "missing" {
                vec![failure(id, "not_found", "Service not found.")]
            } else {
                vec![result(id, json!({ "context": { "id": "ctx-1" } }))]
            }
        }
        "ping" => vec![json!({ "id": id, "type": "pong" })],
        "weather/subscribe_forecast" => vec![
            result(id, Value::Null),
            json!({
                "id": id,
                "type": "event",
                "event": {
                    "type": frame["forecast_type"],
                    "forecast": [{ "condition": "sunny", "temperature": 21 }]
                }
            }),
        ],
        // Answered in reverse order once two have arrived.
        "test/ordered" => {
            let mut held = state.held.lock().unwrap();
            held.push(frame.clone());
            if held.len() < 2 {
                vec![]
            } else {
                held.drain(..)
                    .rev()
                    .map(|f| result(f["id"].as_u64(), json!({ "label": f["label"] })))
                    .collect()
            }
        }
        "test/silent" => vec![],
        _ => vec![failure(id, "unknown_command", "Unknown command.")],
    };
    (replies, false)
}
