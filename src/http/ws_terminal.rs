//! PTY channel WebSocket handler, `/ws/terminal`. One connection maps to
//! at most one PTY session at a time: each text frame is either plain
//! control JSON (`init`/`reconnect`/`input`/`resize`) or, once attached,
//! raw keystrokes forwarded straight to the shell.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::AppState;
use crate::pty::manager::resolve_dir;
use crate::pty::session::{PtyEvent, PtySession};
use crate::types::PtyInbound;

const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Per-connection state machine: `none` until a session is created or
/// reattached, then `attached(session)` for the rest of the connection's
/// life.
enum ClientState {
    None,
    Attached(Arc<PtySession>),
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let client = state.next_client_handle();
    let mut client_state = ClientState::None;
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PtyEvent>();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        client_state = match client_state {
                            ClientState::None => {
                                handle_none_state(&state, client, &text, &event_tx, &mut socket).await
                            }
                            ClientState::Attached(session) => {
                                handle_attached_state(&session, &text);
                                ClientState::Attached(session)
                            }
                        };
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames ignored
                    Some(Err(_)) => break,
                }
            }
            event = event_rx.recv() => {
                match event {
                    Some(PtyEvent::Output(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(PtyEvent::Exited) => {
                        let _ = socket
                            .send(Message::Text("\r\n[Process exited]\r\n".into()))
                            .await;
                    }
                    None => {}
                }
            }
        }
    }

    state.pty_manager.detach(client);
}

async fn handle_none_state(
    state: &AppState,
    client: u64,
    text: &str,
    event_tx: &mpsc::UnboundedSender<PtyEvent>,
    socket: &mut WebSocket,
) -> ClientState {
    let Ok(msg) = serde_json::from_str::<PtyInbound>(text) else {
        send_json(socket, json!({"error": "Expected init or reconnect message"})).await;
        return ClientState::None;
    };

    match msg {
        PtyInbound::Reconnect { session_id } => {
            if state.pty_manager.find_orphan_by_id(&session_id).is_some()
                && state.pty_manager.reattach(&session_id, client, event_tx.clone())
            {
                send_json(socket, json!({"type": "reconnected", "sessionId": session_id})).await;
                match state.pty_manager.session_for(client) {
                    Some(session) => ClientState::Attached(session),
                    None => ClientState::None,
                }
            } else {
                send_json(socket, json!({"type": "reconnect_failed"})).await;
                ClientState::None
            }
        }
        PtyInbound::Init { dir, cols, rows, tmux } => {
            handle_init(state, client, dir, cols, rows, tmux, event_tx, socket).await
        }
        PtyInbound::Input { .. } | PtyInbound::Resize { .. } | PtyInbound::Pong => {
            send_json(socket, json!({"error": "Expected init or reconnect message"})).await;
            ClientState::None
        }
    }
}

async fn handle_init(
    state: &AppState,
    client: u64,
    dir: Option<String>,
    cols: Option<u16>,
    rows: Option<u16>,
    tmux: Option<String>,
    event_tx: &mpsc::UnboundedSender<PtyEvent>,
    socket: &mut WebSocket,
) -> ClientState {
    let dir = dir.unwrap_or_else(|| {
        dirs::home_dir().map(|p| p.to_string_lossy().into_owned()).unwrap_or_else(|| "/".to_string())
    });
    let resolved_dir = resolve_dir(&dir);
    let cols = cols.unwrap_or(DEFAULT_COLS);
    let rows = rows.unwrap_or(DEFAULT_ROWS);

    if let Some(orphan) = tmux
        .as_deref()
        .and_then(|tmux_name| state.pty_manager.find_orphan_by_tmux(tmux_name))
    {
        let id = orphan.id.clone();
        state.pty_manager.reattach(&id, client, event_tx.clone());
        send_json(socket, json!({"type": "reconnected", "sessionId": id})).await;
        return ClientState::Attached(orphan);
    }

    if let Some(orphan) = state.pty_manager.find_orphans_by_dir(&resolved_dir).into_iter().next() {
        let id = orphan.id.clone();
        state.pty_manager.reattach(&id, client, event_tx.clone());
        send_json(socket, json!({"type": "reconnected", "sessionId": id})).await;
        return ClientState::Attached(orphan);
    }

    let tmux_command = tmux
        .as_deref()
        .map(|name| state.tmux.build_create_or_attach_for_named_session(name, Some(&resolved_dir)));

    match state.pty_manager.create_for(
        client,
        &dir,
        cols,
        rows,
        tmux.clone(),
        tmux_command.as_deref(),
        event_tx.clone(),
    ) {
        Ok(session_id) => {
            send_json(socket, json!({"type": "session_created", "sessionId": session_id})).await;
            match state.pty_manager.session_for(client) {
                Some(session) => ClientState::Attached(session),
                None => ClientState::None,
            }
        }
        Err(e) => {
            let _ = socket
                .send(Message::Text(format!("\r\n[Failed to create terminal: {e}]\r\n").into()))
                .await;
            ClientState::None
        }
    }
}

/// Attached-state dispatch: a JSON object is always treated as control
/// data, even when its `type` is unrecognized or it's missing required
/// fields — only text that isn't a JSON object at all falls through to
/// the shell as raw keystrokes.
fn handle_attached_state(session: &PtySession, text: &str) {
    let is_json_object = matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_)));
    match serde_json::from_str::<PtyInbound>(text) {
        Ok(PtyInbound::Input { data }) => session.write(&data),
        Ok(PtyInbound::Resize { cols, rows }) => session.resize(cols, rows),
        // `pong`, a stray `init`/`reconnect`, and any unrecognized type
        // are all ignored once a session is attached.
        Ok(_) => {}
        Err(_) if is_json_object => {}
        Err(_) => session.write(text),
    }
}

async fn send_json(socket: &mut WebSocket, value: Value) {
    let _ = socket.send(Message::Text(value.to_string().into())).await;
}
