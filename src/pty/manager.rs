//! Registry of PTY sessions keyed by id and by client, orphan indexing,
//! and a grace-period reaper for sessions nobody has reattached to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::error::ServerError;
use crate::pty::session::{PtyEvent, PtySession, SessionId};

/// Default grace period before an orphan is unconditionally terminated.
pub const DEFAULT_GRACE_SECONDS: u64 = 60;

/// Identity of a terminal WebSocket connection. Opaque beyond equality
/// and hashing — the manager never inspects it.
pub type ClientHandle = u64;

#[derive(Default)]
struct Maps {
    sessions: HashMap<SessionId, Arc<PtySession>>,
    by_client: HashMap<ClientHandle, SessionId>,
}

/// Process-wide registry of PTY sessions. A single mutex guards both
/// maps; it is never held across `terminate`, `attach`, or `reattach`.
pub struct PtyManager {
    maps: Mutex<Maps>,
    grace: Duration,
}

impl Default for PtyManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_SECONDS))
    }
}

impl PtyManager {
    pub fn new(grace: Duration) -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
            grace,
        }
    }

    /// Validate `dir` (falling back to `$HOME`), spawn a session, insert
    /// it into both maps, and attach `client`.
    pub fn create_for(
        &self,
        client: ClientHandle,
        dir: &str,
        cols: u16,
        rows: u16,
        tmux_name: Option<String>,
        tmux_command: Option<&str>,
        sink: UnboundedSender<PtyEvent>,
    ) -> Result<SessionId, ServerError> {
        let dir = resolve_dir(dir);
        let id = Uuid::new_v4().to_string();
        let session = PtySession::spawn(id.clone(), &dir, cols, rows, tmux_name, tmux_command)?;
        let session = Arc::new(session);
        session.attach(sink);

        let mut maps = self.maps.lock();
        maps.sessions.insert(id.clone(), Arc::clone(&session));
        maps.by_client.insert(client, id.clone());
        Ok(id)
    }

    pub fn session_for(&self, client: ClientHandle) -> Option<Arc<PtySession>> {
        let maps = self.maps.lock();
        let id = maps.by_client.get(&client)?;
        maps.sessions.get(id).cloned()
    }

    /// Remove the `client -> id` mapping and detach the session, leaving
    /// it registered as an orphan.
    pub fn detach(&self, client: ClientHandle) {
        let session = {
            let mut maps = self.maps.lock();
            let Some(id) = maps.by_client.remove(&client) else {
                return;
            };
            maps.sessions.get(&id).cloned()
        };
        if let Some(session) = session {
            session.detach();
        }
    }

    /// Like `detach`, but also terminates the session and drops it from
    /// the registry entirely.
    pub fn remove(&self, client: ClientHandle) {
        let session = {
            let mut maps = self.maps.lock();
            let Some(id) = maps.by_client.remove(&client) else {
                return;
            };
            maps.sessions.remove(&id)
        };
        if let Some(session) = session {
            session.terminate();
        }
    }

    pub fn find_orphan_by_id(&self, id: &str) -> Option<Arc<PtySession>> {
        let maps = self.maps.lock();
        maps.sessions
            .get(id)
            .filter(|s| s.is_orphaned())
            .cloned()
    }

    pub fn find_orphans_by_dir(&self, dir: &str) -> Vec<Arc<PtySession>> {
        let maps = self.maps.lock();
        maps.sessions
            .values()
            .filter(|s| s.is_orphaned() && s.working_dir == dir)
            .cloned()
            .collect()
    }

    pub fn find_orphan_by_tmux(&self, name: &str) -> Option<Arc<PtySession>> {
        let maps = self.maps.lock();
        maps.sessions
            .values()
            .find(|s| s.is_orphaned() && s.tmux_name.as_deref() == Some(name))
            .cloned()
    }

    /// If `id` names an orphan, bind `client` to it and reattach.
    pub fn reattach(&self, id: &str, client: ClientHandle, sink: UnboundedSender<PtyEvent>) -> bool {
        let session = {
            let mut maps = self.maps.lock();
            let Some(session) = maps.sessions.get(id).filter(|s| s.is_orphaned()).cloned() else {
                return false;
            };
            maps.by_client.insert(client, id.to_string());
            session
        };
        session.reattach(sink);
        true
    }

    /// Terminate every orphan whose grace period has elapsed. Candidates
    /// are snapshotted under the lock; `terminate()` itself runs outside
    /// it.
    pub fn reap_orphans(&self) -> usize {
        let expired: Vec<Arc<PtySession>> = {
            let mut maps = self.maps.lock();
            let now = Instant::now();
            let expired_ids: Vec<SessionId> = maps
                .sessions
                .iter()
                .filter(|(_, s)| {
                    s.is_orphaned()
                        && s.last_disconnected_at()
                            .is_some_and(|t| now.duration_since(t) > self.grace)
                })
                .map(|(id, _)| id.clone())
                .collect();
            expired_ids
                .iter()
                .filter_map(|id| maps.sessions.remove(id))
                .collect()
        };
        let count = expired.len();
        for session in expired {
            session.terminate();
        }
        count
    }

    /// Terminate every session and clear both maps.
    pub fn remove_all(&self) {
        let sessions: Vec<Arc<PtySession>> = {
            let mut maps = self.maps.lock();
            let sessions = maps.sessions.values().cloned().collect();
            maps.sessions.clear();
            maps.by_client.clear();
            sessions
        };
        for session in sessions {
            session.terminate();
        }
    }
}

/// Validate that `dir` exists and is a directory, else substitute
/// `$HOME`.
pub fn resolve_dir(dir: &str) -> String {
    if std::path::Path::new(dir).is_dir() {
        dir.to_string()
    } else {
        dirs::home_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_dir_falls_back_to_home_for_missing_dir() {
        let resolved = resolve_dir("/definitely/not/a/real/path/xyz");
        assert_ne!(resolved, "/definitely/not/a/real/path/xyz");
    }

    #[test]
    fn resolve_dir_keeps_existing_dir() {
        assert_eq!(resolve_dir("/tmp"), "/tmp");
    }

    #[test]
    fn reattach_to_unknown_id_returns_false() {
        let manager = PtyManager::default();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        assert!(!manager.reattach("nonexistent", 1, tx));
    }

    #[test]
    fn detach_of_unknown_client_is_a_noop() {
        let manager = PtyManager::default();
        manager.detach(999);
    }

    #[test]
    fn create_detach_reattach_round_trip() {
        let manager = PtyManager::default();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let id = manager
            .create_for(1, "/tmp", 80, 24, None, None, tx)
            .expect("shell spawn should succeed");

        assert!(manager.session_for(1).is_some());
        manager.detach(1);
        assert!(manager.session_for(1).is_none());
        assert!(manager.find_orphan_by_id(&id).is_some());

        let (tx2, _rx2) = tokio::sync::mpsc::unbounded_channel();
        assert!(manager.reattach(&id, 2, tx2));
        let session = manager.session_for(2).expect("reattached session");
        assert_eq!(session.id, id);
        assert!(!session.is_orphaned());

        manager.remove(2);
    }

    #[test]
    fn reap_orphans_terminates_expired_orphan() {
        let manager = PtyManager::new(Duration::from_millis(1));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let id = manager
            .create_for(1, "/tmp", 80, 24, None, None, tx)
            .expect("shell spawn should succeed");
        manager.detach(1);

        std::thread::sleep(Duration::from_millis(50));

        let session = manager.find_orphan_by_id(&id).expect("still an orphan");
        assert_eq!(manager.reap_orphans(), 1);
        assert!(session.is_terminated());
        assert!(manager.find_orphan_by_id(&id).is_none());
    }
}
