//! Shell WebSocket connection handling (spec §4.F / §6).
//!
//! A single socket at `/ws` can drive several concurrent remote shells:
//! the server binds a session the first time a message arrives carrying
//! its id, not at connect time. Structure mirrors the teacher's
//! `ws/connection.rs`: origin check before upgrade, then a
//! `tokio::select!` loop bridging inbound client frames against a
//! shared, session-tagged outbound channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::session::{SessionId, SshSession};
use crate::shell::ShellFrame;
use crate::ws::protocol::{ClientMessage, ServerMessage};
use crate::ws::rate_limit::RateLimiter;
use crate::AppState;

const LIVENESS_INTERVAL: Duration = Duration::from_secs(30);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

/// A [`ShellFrame`] tagged with the session it came from, so several
/// sessions can share one outbound channel into the socket.
struct TaggedFrame {
    session_id: SessionId,
    frame: ShellFrame,
}

pub async fn shell_ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !state.origin_validator.check(origin) {
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut rate_limiter = RateLimiter::default_ws();
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);
    let mut last_seen = tokio::time::Instant::now();

    let mut bound: HashMap<SessionId, Arc<SshSession>> = HashMap::new();
    let (aggregator_tx, mut aggregator_rx) = mpsc::unbounded_channel::<TaggedFrame>();

    loop {
        tokio::select! {
            tagged = aggregator_rx.recv() => {
                match tagged {
                    Some(TaggedFrame { session_id, frame: ShellFrame::Output(bytes) }) => {
                        if send_text(&mut sink, &ServerMessage::output(&session_id, &bytes)).await.is_err() {
                            break;
                        }
                    }
                    Some(TaggedFrame { session_id, frame: ShellFrame::Closed }) => {
                        if send_text(&mut sink, &ServerMessage::disconnect(&session_id)).await.is_err() {
                            break;
                        }
                        bound.remove(&session_id);
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = tokio::time::Instant::now();
                        if !rate_limiter.try_consume() {
                            if let Ok(message) = ClientMessage::parse(&text) {
                                let _ = send_text(&mut sink, &ServerMessage::error(message.session_id(), "slow down")).await;
                            }
                            continue;
                        }
                        if handle_client_message(&text, &state, &mut bound, &aggregator_tx, &mut sink).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = liveness.tick() => {
                if last_seen.elapsed() > LIVENESS_TIMEOUT {
                    break;
                }
                let _ = sink.send(Message::Ping(Vec::new())).await;
            }
        }
    }

    for session_id in bound.keys() {
        state.shell_bridge.unbind(session_id).await;
    }
}

async fn handle_client_message(
    raw: &str,
    state: &AppState,
    bound: &mut HashMap<SessionId, Arc<SshSession>>,
    aggregator_tx: &mpsc::UnboundedSender<TaggedFrame>,
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
) -> Result<(), ()> {
    let message = match ClientMessage::parse(raw) {
        Ok(m) => m,
        Err(e) => {
            // No session id could be recovered from unparseable input;
            // report against whatever the client sent back verbatim is
            // not possible, so this is the one frame without one.
            let _ = send_text(sink, &ServerMessage::error("", e.to_string())).await;
            return Ok(());
        }
    };

    match message {
        ClientMessage::Input { session_id, data } => {
            let bytes = match ClientMessage::decode_input(&data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = send_text(sink, &ServerMessage::error(&session_id, e.to_string())).await;
                    return Ok(());
                }
            };
            let session = match ensure_bound(state, bound, aggregator_tx, &session_id, DEFAULT_COLS, DEFAULT_ROWS).await {
                Ok(session) => session,
                Err(e) => {
                    let _ = send_text(sink, &ServerMessage::error(&session_id, e)).await;
                    return Ok(());
                }
            };
            state.shell_bridge.send_input(&session, bytes).await;
        }
        ClientMessage::Resize { session_id, cols, rows } => {
            let session = match ensure_bound(state, bound, aggregator_tx, &session_id, cols, rows).await {
                Ok(session) => session,
                Err(e) => {
                    let _ = send_text(sink, &ServerMessage::error(&session_id, e)).await;
                    return Ok(());
                }
            };
            state.shell_bridge.resize(&session, cols, rows).await;
        }
        ClientMessage::Ping { session_id } => {
            let _ = send_text(sink, &ServerMessage::pong(&session_id)).await;
        }
    }
    Ok(())
}

/// Binds `session_id` to this socket's shared aggregator on first use,
/// relaying its frames in under the session's own tag. A session already
/// bound to this socket is returned as-is; `cols`/`rows` only matter for
/// the first bind, which creates the shell.
async fn ensure_bound(
    state: &AppState,
    bound: &mut HashMap<SessionId, Arc<SshSession>>,
    aggregator_tx: &mpsc::UnboundedSender<TaggedFrame>,
    session_id: &str,
    cols: u16,
    rows: u16,
) -> Result<Arc<SshSession>, String> {
    if let Some(session) = bound.get(session_id) {
        return Ok(session.clone());
    }

    let session = state
        .registry
        .get(session_id)
        .await
        .ok_or_else(|| "no such session".to_string())?;

    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<ShellFrame>();
    state.shell_bridge.bind(&session, cols, rows, relay_tx).await?;

    let tagged_tx = aggregator_tx.clone();
    let tagged_id = session_id.to_string();
    tokio::spawn(async move {
        while let Some(frame) = relay_rx.recv().await {
            if tagged_tx
                .send(TaggedFrame {
                    session_id: tagged_id.clone(),
                    frame,
                })
                .is_err()
            {
                break;
            }
        }
    });

    bound.insert(session_id.to_string(), session.clone());
    Ok(session)
}

async fn send_text(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    sink.send(Message::Text(message.to_json())).await
}
