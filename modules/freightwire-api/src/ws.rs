//! Push protocol: `/ws/articles` upgrade with server-side filtering.
//!
//! Frames are JSON text: `{"type":"new_article","data":{…}}` and
//! `{"type":"ping"}`; clients answer pings with `{"type":"pong"}`. Close
//! codes: 1008 auth failure, 1013 capacity.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

use freightwire_common::SubscriptionFilter;

use crate::auth::verify_key;
use crate::AppState;

/// Heartbeat cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A connection silent for this long is closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const CLOSE_POLICY: u16 = 1008;
const CLOSE_CAPACITY: u16 = 1013;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    transport_mode: Option<String>,
    topic: Option<String>,
    region: Option<String>,
    language: Option<String>,
    /// Key may arrive as a query param since browsers cannot set headers on
    /// WebSocket upgrades.
    api_key: Option<String>,
}

impl WsParams {
    fn filter(&self) -> SubscriptionFilter {
        let one = |v: &Option<String>| -> Vec<String> {
            v.iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase())
                .collect()
        };
        SubscriptionFilter {
            source_ids: Vec::new(),
            transport_modes: one(&self.transport_mode),
            topics: one(&self.topic),
            regions: one(&self.region),
            languages: self
                .language
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
            urgency_min: None,
        }
    }
}

pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    // Authenticate before registering; failures still upgrade so the client
    // receives a proper close code.
    let header_key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let api_key = header_key.or_else(|| params.api_key.clone());

    let authed = verify_key(&state, api_key.as_deref()).await.is_ok();
    let filter = params.filter();

    ws.on_upgrade(move |socket| handle_socket(state, socket, filter, authed))
}

async fn handle_socket(
    state: Arc<AppState>,
    mut socket: WebSocket,
    filter: SubscriptionFilter,
    authed: bool,
) {
    if !authed {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY,
                reason: "authentication failed".into(),
            })))
            .await;
        return;
    }

    let handle = match state.registry.register(filter) {
        Ok(handle) => handle,
        Err(_) => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_CAPACITY,
                    reason: "capacity".into(),
                })))
                .await;
            return;
        }
    };

    info!(connections = state.registry.connection_count(), "push client connected");

    let mut ping = interval(PING_INTERVAL);
    ping.tick().await; // immediate first tick
    let mut last_seen = Instant::now();
    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: 1000,
                        reason: "server shutdown".into(),
                    })))
                    .await;
                break;
            }
            frame = handle.recv() => {
                if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() > IDLE_TIMEOUT {
                    debug!("push client idle, closing");
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: 1000,
                            reason: "idle timeout".into(),
                        })))
                        .await;
                    break;
                }
                if socket
                    .send(Message::Text(r#"{"type":"ping"}"#.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(_)))
                    | Some(Ok(Message::Pong(_)))
                    | Some(Ok(Message::Ping(_))) => {
                        // Any client traffic counts as liveness.
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    drop(handle);
    info!(connections = state.registry.connection_count(), "push client disconnected");
}
