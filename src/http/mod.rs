//! HTTP router: static assets, REST surface, and the two WebSocket
//! upgrade paths, composed as route groups merged together and layered
//! with CORS and a body-size limit. No auth middleware layer — this
//! crate leaves authentication and TLS termination to whatever sits in
//! front of it.

pub mod assets;
pub mod rest;
pub mod ws_state;
pub mod ws_terminal;

use std::sync::atomic::{AtomicU32, AtomicU64};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::broadcaster::StateBroadcaster;
use crate::config::Config;
use crate::host::HostBridge;
use crate::pty::PtyManager;
use crate::tmux::TmuxRegistry;

/// Body size limit for REST requests.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state threaded through every handler via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub host: Arc<dyn HostBridge>,
    pub pty_manager: Arc<PtyManager>,
    pub tmux: Arc<TmuxRegistry>,
    pub broadcaster: Arc<StateBroadcaster>,
    pub started_at: Instant,
    pub next_client_id: Arc<AtomicU64>,
    pub state_client_count: Arc<AtomicU32>,
}

impl AppState {
    pub fn new(
        config: Config,
        host: Arc<dyn HostBridge>,
        pty_manager: Arc<PtyManager>,
        tmux: Arc<TmuxRegistry>,
        broadcaster: Arc<StateBroadcaster>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            host,
            pty_manager,
            tmux,
            broadcaster,
            started_at: Instant::now(),
            next_client_id: Arc::new(AtomicU64::new(1)),
            state_client_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn next_client_handle(&self) -> u64 {
        self.next_client_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

/// Build the full route table.
pub fn build_router(state: AppState) -> Router {
    let static_routes = Router::new()
        .route("/", get(assets::serve_index))
        .route("/style.css", get(assets::serve_style))
        .route("/app.js", get(assets::serve_app_js))
        .route("/manifest.json", get(assets::serve_manifest))
        .route("/sw.js", get(assets::serve_service_worker));

    let rest_routes = Router::new()
        .route("/api/status", get(rest::status))
        .route("/api/workspaces", get(rest::list_workspaces))
        .route("/api/notifications", get(rest::list_notifications))
        .route("/api/workspaces/{id}/select", post(rest::select_workspace))
        .route("/api/command", post(rest::command))
        .route("/api/workspaces/new", post(rest::new_workspace))
        .route("/api/workspaces/{id}/tmux", post(rest::set_workspace_tmux))
        .route("/api/workspaces/{id}/split", post(rest::split_panel))
        .route(
            "/api/tmux/sessions",
            get(rest::list_tmux_sessions).delete(rest::kill_all_tmux_sessions),
        )
        .route("/api/tmux/sessions/{name}", delete(rest::kill_tmux_session))
        .route("/api/cc/sessions", get(rest::cc_sessions))
        .route("/api/cc/resume", post(rest::cc_resume));

    let ws_routes = Router::new()
        .route("/ws", get(ws_state::ws_handler))
        .route("/ws/terminal", get(ws_terminal::ws_handler));

    Router::new()
        .merge(static_routes)
        .merge(rest_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
