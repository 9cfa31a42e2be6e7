//! State channel WebSocket handler, `/ws`: a `tokio::select!` loop that
//! simultaneously awaits socket reads and a broadcast subscription, so
//! inbound commands and outbound state pushes interleave on one
//! connection.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use super::AppState;
use crate::bridge;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    state.state_client_count.fetch_add(1, Ordering::SeqCst);
    let mut broadcast_rx = state.broadcaster.subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_text(&state, &text).await {
                            if socket.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong frames ignored
                    Some(Err(_)) => break,
                }
            }
            frame = broadcast_rx.recv() => {
                match frame {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    state.state_client_count.fetch_sub(1, Ordering::SeqCst);
}

/// `pong` is swallowed; anything else is forwarded to the command
/// bridge, with `id` correlated into the reply if present.
async fn handle_text(state: &AppState, text: &str) -> Option<String> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Some(json!({"error": "Malformed JSON"}).to_string()),
    };
    if value.get("type").and_then(Value::as_str) == Some("pong") {
        return None;
    }
    let id = value.get("id").cloned();
    let result = bridge::dispatch(&*state.host, value).await;
    let correlated = bridge::correlate_id(result, id);
    Some(serde_json::to_string(&correlated).unwrap_or_else(|_| bridge::timeout_envelope().to_string()))
}
