//! REST surface. Every handler that needs host-app state goes through
//! the command bridge; handlers never touch host state directly, since
//! only the host's own consumer task may read or mutate it.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::bridge;

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.host.snapshot();
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspaceCount": snapshot.workspaces.len() as u32,
        "selectedWorkspace": snapshot.selected_workspace,
        "unreadCount": snapshot.unread_count,
        "connectedClients": state.state_client_count.load(std::sync::atomic::Ordering::SeqCst),
        "port": state.config.port,
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

pub async fn list_workspaces(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.host.snapshot().workspaces))
}

/// Up to 50 most recent notification snapshots.
pub async fn list_notifications(State(state): State<AppState>) -> Json<Value> {
    let mut notifications = state.host.snapshot().notifications;
    notifications.sort_by_key(|n| std::cmp::Reverse(n.created_at));
    notifications.truncate(50);
    Json(json!(notifications))
}

pub async fn select_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Value> {
    let result = bridge::dispatch(
        &*state.host,
        json!({"method": "workspace.select", "params": {"id": id}}),
    )
    .await;
    Json(result)
}

pub async fn command(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    Json(bridge::dispatch(&*state.host, body).await)
}

#[derive(Debug, Deserialize)]
pub struct NewWorkspaceRequest {
    #[serde(default)]
    pub tmux: Option<bool>,
    #[serde(default)]
    pub directory: Option<String>,
}

pub async fn new_workspace(
    State(state): State<AppState>,
    Json(req): Json<NewWorkspaceRequest>,
) -> Json<Value> {
    let result = bridge::dispatch(
        &*state.host,
        json!({"method": "workspace.create", "params": {"tmux": req.tmux, "directory": req.directory}}),
    )
    .await;
    Json(result)
}

#[derive(Debug, Deserialize)]
pub struct SetTmuxRequest {
    #[serde(rename = "isTmuxEnabled")]
    pub enabled: bool,
}

pub async fn set_workspace_tmux(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetTmuxRequest>,
) -> Json<Value> {
    let result = bridge::dispatch(
        &*state.host,
        json!({"method": "workspace.setTmux", "params": {"id": id, "enabled": req.enabled}}),
    )
    .await;
    let ok = result.get("ok").and_then(Value::as_bool).unwrap_or(false);
    Json(json!({"ok": ok, "tmuxEnabled": req.enabled}))
}

#[derive(Debug, Deserialize)]
pub struct SplitRequest {
    pub direction: String,
}

pub async fn split_panel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SplitRequest>,
) -> Json<Value> {
    let result = bridge::dispatch(
        &*state.host,
        json!({"method": "panel.split", "params": {"workspaceId": id, "direction": req.direction}}),
    )
    .await;
    let ok = result.get("ok").and_then(Value::as_bool).unwrap_or(false);
    Json(json!({"ok": ok}))
}

pub async fn list_tmux_sessions(State(state): State<AppState>) -> Json<Value> {
    let tmux = state.tmux.clone();
    let sessions = tokio::task::spawn_blocking(move || tmux.list_active_sessions())
        .await
        .unwrap_or_default();
    Json(json!(sessions))
}

pub async fn kill_tmux_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Value> {
    let tmux = state.tmux.clone();
    let killed = tokio::task::spawn_blocking(move || {
        let existed = tmux.session_exists(&name);
        tmux.kill_session(&name);
        existed
    })
    .await
    .unwrap_or(false);
    Json(json!({"ok": true, "killed": killed}))
}

pub async fn kill_all_tmux_sessions(State(state): State<AppState>) -> Json<Value> {
    let tmux = state.tmux.clone();
    let killed = tokio::task::spawn_blocking(move || {
        let sessions = tmux.list_active_sessions();
        let count = sessions.len();
        tmux.kill_all_sessions();
        count
    })
    .await
    .unwrap_or(0);
    Json(json!({"ok": true, "killed": killed}))
}

/// Summary of a recent agent transcript under the host's state directory.
#[derive(Debug, serde::Serialize)]
pub struct CcSessionSummary {
    pub path: String,
    #[serde(rename = "modifiedAt")]
    pub modified_at: i64,
}

pub async fn cc_sessions(State(_state): State<AppState>) -> Json<Value> {
    let summaries = tokio::task::spawn_blocking(scan_cc_sessions)
        .await
        .unwrap_or_default();
    Json(json!(summaries))
}

fn scan_cc_sessions() -> Vec<CcSessionSummary> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    let root = home.join(".claude").join("projects");
    let Ok(entries) = std::fs::read_dir(&root) else {
        return Vec::new();
    };
    let mut summaries: Vec<CcSessionSummary> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let modified = entry.metadata().ok()?.modified().ok()?;
            let modified_at = modified
                .duration_since(std::time::UNIX_EPOCH)
                .ok()?
                .as_secs() as i64;
            Some(CcSessionSummary {
                path: path.to_string_lossy().into_owned(),
                modified_at,
            })
        })
        .collect();
    summaries.sort_by_key(|s| std::cmp::Reverse(s.modified_at));
    summaries.truncate(50);
    summaries
}

#[derive(Debug, Deserialize)]
pub struct CcResumeRequest {
    #[serde(rename = "projectPath")]
    pub project_path: String,
}

pub async fn cc_resume(
    State(state): State<AppState>,
    Json(req): Json<CcResumeRequest>,
) -> Json<Value> {
    let result = bridge::dispatch(
        &*state.host,
        json!({"method": "workspace.create", "params": {"directory": req.project_path}}),
    )
    .await;
    let workspace_id = result.get("workspaceId").cloned();
    Json(json!({"ok": true, "workspaceId": workspace_id}))
}
