//! Periodic workspace/tmux snapshot fan-out, ping timer, orphan reaper,
//! and notification push, all running as tokio tasks that reach host
//! state only through [`HostBridge`]. Broadcast is non-blocking and
//! tolerant of lagging subscribers: a slow client drops old frames
//! rather than stalling the broadcaster.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::host::HostBridge;
use crate::pty::PtyManager;
use crate::tmux::TmuxRegistry;
use crate::types::{NotificationSnapshot, StateOutbound, TmuxSession};

const STATE_INTERVAL: Duration = Duration::from_millis(2000);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const REAP_INTERVAL: Duration = Duration::from_secs(15);
const TMUX_REFRESH_THROTTLE: Duration = Duration::from_secs(10);

/// Channel capacity for the outbound text-frame broadcast. Generous
/// relative to client count; a lagging subscriber drops old frames
/// rather than stalling the broadcaster.
const BROADCAST_CAPACITY: usize = 256;

struct TmuxCache {
    refreshed_at: Instant,
    sessions: Vec<TmuxSession>,
}

/// Fans out state/notification/ping text frames to every connected state
/// client. Clients subscribe via [`StateBroadcaster::subscribe`]; the
/// broadcaster never tracks individual client identity itself — that
/// lives in the HTTP layer's WebSocket handler.
pub struct StateBroadcaster {
    tx: broadcast::Sender<String>,
    host: Arc<dyn HostBridge>,
    pty_manager: Arc<PtyManager>,
    tmux: Arc<TmuxRegistry>,
    tmux_cache: Mutex<TmuxCache>,
}

impl StateBroadcaster {
    pub fn new(host: Arc<dyn HostBridge>, pty_manager: Arc<PtyManager>, tmux: Arc<TmuxRegistry>) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            host,
            pty_manager,
            tmux,
            tmux_cache: Mutex::new(TmuxCache {
                refreshed_at: Instant::now() - TMUX_REFRESH_THROTTLE,
                sessions: Vec::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Fan out a notification handed down from the host to every
    /// currently-connected state client. Not buffered for clients that
    /// connect later.
    pub fn push_notification(&self, notification: NotificationSnapshot) {
        self.send(&StateOutbound::Notification { notification });
    }

    fn send(&self, message: &StateOutbound) {
        match serde_json::to_string(message) {
            Ok(text) => {
                // `send` only errors when there are zero receivers, which
                // is an expected steady state, not a failure.
                let _ = self.tx.send(text);
            }
            Err(e) => warn!("failed to serialize state broadcast: {e}"),
        }
    }

    fn refresh_tmux_snapshot_if_stale(&self) -> Vec<TmuxSession> {
        let mut cache = self.tmux_cache.lock();
        if cache.refreshed_at.elapsed() >= TMUX_REFRESH_THROTTLE {
            cache.sessions = self.tmux.list_active_sessions();
            cache.refreshed_at = Instant::now();
        }
        cache.sessions.clone()
    }

    /// Spawn the three periodic timers as tokio tasks, all cancelled
    /// together when `shutdown` is signalled.
    pub fn spawn_timers(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        self.spawn_state_timer(shutdown.clone());
        self.spawn_ping_timer(shutdown.clone());
        self.spawn_reap_timer(shutdown);
    }

    fn spawn_state_timer(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if this.tx.receiver_count() == 0 {
                            continue;
                        }
                        let tmux_sessions = this.refresh_tmux_snapshot_if_stale();
                        let workspaces = this.host.snapshot().workspaces;
                        this.send(&StateOutbound::State { data: workspaces, tmux_sessions });
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    fn spawn_ping_timer(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PING_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => this.send(&StateOutbound::Ping),
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    fn spawn_reap_timer(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let manager = Arc::clone(&this.pty_manager);
                        let reaped = tokio::task::spawn_blocking(move || manager.reap_orphans())
                            .await
                            .unwrap_or(0);
                        if reaped > 0 {
                            log::debug!("reaped {reaped} orphaned pty session(s)");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHostBridge;

    fn make_broadcaster() -> Arc<StateBroadcaster> {
        Arc::new(StateBroadcaster::new(
            Arc::new(StaticHostBridge::demo()),
            Arc::new(PtyManager::default()),
            Arc::new(TmuxRegistry::new("tmux".to_string())),
        ))
    }

    #[test]
    fn push_notification_is_a_noop_with_no_subscribers() {
        let broadcaster = make_broadcaster();
        broadcaster.push_notification(NotificationSnapshot {
            id: "1".into(),
            title: "t".into(),
            subtitle: "s".into(),
            body: "b".into(),
            tab_id: "tab".into(),
            is_read: false,
            created_at: 0,
        });
    }

    #[tokio::test]
    async fn subscriber_receives_pushed_notification() {
        let broadcaster = make_broadcaster();
        let mut rx = broadcaster.subscribe();
        broadcaster.push_notification(NotificationSnapshot {
            id: "1".into(),
            title: "t".into(),
            subtitle: "s".into(),
            body: "b".into(),
            tab_id: "tab".into(),
            is_read: false,
            created_at: 0,
        });
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("\"type\":\"notification\""));
        assert!(frame.contains("\"id\":\"1\""));
    }

    #[test]
    fn tmux_snapshot_refresh_is_throttled() {
        let broadcaster = make_broadcaster();
        let first = broadcaster.refresh_tmux_snapshot_if_stale();
        let second = broadcaster.refresh_tmux_snapshot_if_stale();
        assert_eq!(first, second);
    }
}
