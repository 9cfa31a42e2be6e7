//! The boundary between this crate and the host application.
//!
//! The host owns workspace/tab/notification state and is the only legal
//! caller of its own APIs. This crate never touches that state directly;
//! it reaches it only through [`HostBridge`], which forwards to whatever
//! thread the host's own consumer task runs on.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use crate::error::ServerError;
use crate::types::{NotificationSnapshot, WorkspaceSnapshot};

/// Hard timeout for a single bridged command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A narrow read of host-app state, opaque beyond what the wire protocol
/// needs.
#[derive(Debug, Clone, Default)]
pub struct HostSnapshot {
    pub workspaces: Vec<WorkspaceSnapshot>,
    pub selected_workspace: Option<String>,
    pub unread_count: u32,
    pub notifications: Vec<NotificationSnapshot>,
}

/// The single entry point into the host application's command dispatch
/// and state model. Implementations MUST marshal to whatever thread owns
/// host state; callers here never assume anything about that thread.
pub trait HostBridge: Send + Sync {
    /// Dispatch a JSON-RPC-shaped command and wait for the host's reply.
    /// Implementations should honor [`COMMAND_TIMEOUT`] themselves or rely
    /// on the caller's timeout wrapper (see `bridge::dispatch`).
    fn handle_command(&self, cmd: Value) -> BoxFuture<'_, Result<Value, ServerError>>;

    /// Synchronous read of the narrow state slice the wire protocol needs.
    fn snapshot(&self) -> HostSnapshot;
}

/// Forwards every command through an [`async_channel`] to a single
/// logical consumer task, as opaque JSON plus a one-shot reply slot.
pub struct ChannelHostBridge {
    sender: async_channel::Sender<HostCommand>,
    snapshot: parking_lot::Mutex<HostSnapshot>,
}

/// What the consumer task receives per command: the raw JSON plus a
/// one-shot slot to reply through exactly once.
pub struct HostCommand {
    pub cmd: Value,
    pub reply: tokio::sync::oneshot::Sender<Value>,
}

impl ChannelHostBridge {
    /// Build a bridge plus the receiver half a consumer task should drain
    /// in a loop, replying to each `reply` sender exactly once.
    pub fn new(capacity: usize) -> (Self, async_channel::Receiver<HostCommand>) {
        let (sender, receiver) = async_channel::bounded(capacity);
        (
            Self {
                sender,
                snapshot: parking_lot::Mutex::new(HostSnapshot::default()),
            },
            receiver,
        )
    }

    /// Replace the cached snapshot; called by the consumer task after it
    /// observes host-state changes.
    pub fn update_snapshot(&self, snapshot: HostSnapshot) {
        *self.snapshot.lock() = snapshot;
    }
}

impl HostBridge for ChannelHostBridge {
    fn handle_command(&self, cmd: Value) -> BoxFuture<'_, Result<Value, ServerError>> {
        Box::pin(async move {
            let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
            self.sender
                .send(HostCommand { cmd, reply: reply_tx })
                .await
                .map_err(|_| ServerError::CommandTimeout)?;
            tokio::time::timeout(COMMAND_TIMEOUT, reply_rx)
                .await
                .map_err(|_| ServerError::CommandTimeout)?
                .map_err(|_| ServerError::CommandTimeout)
        })
    }

    fn snapshot(&self) -> HostSnapshot {
        self.snapshot.lock().clone()
    }
}

/// In-memory test double and `cargo run` demo target: answers every
/// command with `{ok:true}` and serves a fixed workspace list, so the
/// HTTP/WS surface has something to exercise without a real host
/// application attached.
pub struct StaticHostBridge {
    snapshot: HostSnapshot,
}

impl StaticHostBridge {
    pub fn new(snapshot: HostSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn demo() -> Self {
        Self::new(HostSnapshot {
            workspaces: vec![WorkspaceSnapshot {
                id: "demo".into(),
                title: "demo".into(),
                directory: "/tmp".into(),
                panel_count: 0,
                unread_count: 0,
                is_pinned: false,
                is_tmux_enabled: false,
                is_selected: true,
                color: None,
                panels: None,
                layout: None,
            }],
            selected_workspace: Some("demo".into()),
            unread_count: 0,
            notifications: Vec::new(),
        })
    }
}

impl HostBridge for StaticHostBridge {
    fn handle_command(&self, _cmd: Value) -> BoxFuture<'_, Result<Value, ServerError>> {
        Box::pin(async move { Ok(serde_json::json!({"ok": true})) })
    }

    fn snapshot(&self) -> HostSnapshot {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_bridge_answers_ok() {
        let bridge = StaticHostBridge::demo();
        let reply = bridge.handle_command(serde_json::json!({"method": "noop"})).await.unwrap();
        assert_eq!(reply, serde_json::json!({"ok": true}));
    }

    #[test]
    fn static_bridge_exposes_demo_workspace() {
        let bridge = StaticHostBridge::demo();
        let snap = bridge.snapshot();
        assert_eq!(snap.workspaces.len(), 1);
        assert_eq!(snap.selected_workspace.as_deref(), Some("demo"));
    }
}
