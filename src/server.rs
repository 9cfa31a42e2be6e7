//! Server lifecycle: binds the listener (with port cleanup and bind
//! retries), builds the router, and serves until asked to stop, on a
//! tokio multi-thread runtime with graceful shutdown via a `watch`
//! channel.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use tokio::sync::watch;

use crate::broadcaster::StateBroadcaster;
use crate::config::Config;
use crate::error::ServerError;
use crate::host::HostBridge;
use crate::http::{self, AppState};
use crate::port_cleanup;
use crate::pty::PtyManager;
use crate::tmux::{self, TmuxRegistry};

/// The embedded remote-access server. Dependency-injected end to end —
/// no global state — so tests can construct one with an in-process
/// `HostBridge`.
pub struct RemoteServer {
    shutdown_tx: watch::Sender<bool>,
    pub pty_manager: Arc<PtyManager>,
    pub tmux: Arc<TmuxRegistry>,
    pub broadcaster: Arc<StateBroadcaster>,
    pub local_addr: SocketAddr,
}

impl RemoteServer {
    /// Evict stale processes holding `config.port`, bind, build the
    /// router, and start serving in the background. Returns immediately
    /// once the listener is bound.
    pub async fn start(config: Config, host: Arc<dyn HostBridge>) -> Result<Self, ServerError> {
        if !config.enabled {
            return Err(ServerError::StartupFailure("remote server disabled".into()));
        }

        let own_pid = std::process::id();
        let port = config.port;
        tokio::task::spawn_blocking(move || port_cleanup::release_port(port, own_pid))
            .await
            .map_err(|e| ServerError::StartupFailure(e.to_string()))?;

        let addr = SocketAddr::new(config.bind_addr, config.port);
        let std_listener = port_cleanup::bind_with_retries(|| std::net::TcpListener::bind(addr))
            .map_err(|e| ServerError::StartupFailure(e.to_string()))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| ServerError::StartupFailure(e.to_string()))?;
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::StartupFailure(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::StartupFailure(e.to_string()))?;

        let tmux_path = tmux::resolve_tmux_path();
        if tmux_path == "tmux" && !std::path::Path::new("/usr/bin/tmux").exists() {
            info!("tmux binary resolved via PATH search fallback");
        }
        let tmux = Arc::new(TmuxRegistry::new(tmux_path));
        let pty_manager = Arc::new(PtyManager::default());
        let broadcaster = Arc::new(StateBroadcaster::new(
            Arc::clone(&host),
            Arc::clone(&pty_manager),
            Arc::clone(&tmux),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        broadcaster.spawn_timers(shutdown_rx.clone());

        let state = AppState::new(
            config,
            host,
            Arc::clone(&pty_manager),
            Arc::clone(&tmux),
            Arc::clone(&broadcaster),
        );
        let router = http::build_router(state);

        let mut serve_shutdown = shutdown_rx;
        tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = serve_shutdown.changed().await;
            });
            if let Err(e) = serve.await {
                error!("remote server exited with error: {e}");
            }
        });

        info!("remote server listening on {local_addr}");
        Ok(Self {
            shutdown_tx,
            pty_manager,
            tmux,
            broadcaster,
            local_addr,
        })
    }

    /// Stop serving, cancel every broadcaster timer, and terminate every
    /// PTY session.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.pty_manager.remove_all();
    }
}
