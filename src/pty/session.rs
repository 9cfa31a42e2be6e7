//! One forked shell behind one pseudo-terminal, built on `portable-pty`:
//! a dedicated reader OS thread bridges PTY output to async code via a
//! channel, restructured around a single session object per shell
//! rather than a flat terminal map.

use std::io::{Read, Write};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, warn};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ServerError;

pub type SessionId = String;

const READ_CHUNK: usize = 16 * 1024;

fn format_panic(payload: &dyn std::any::Any) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Events emitted by a session's read pump toward whichever client is
/// currently attached.
#[derive(Debug, Clone)]
pub enum PtyEvent {
    /// A chunk of PTY output, already decoded (UTF-8, falling back to a
    /// byte-for-codepoint Latin-1 mapping so no bytes are lost).
    Output(String),
    /// The child process exited or the fd hit an unrecoverable error.
    Exited,
}

/// Environment every spawned shell or tmux attach runs under.
fn base_env() -> [(&'static str, &'static str); 4] {
    [
        ("TERM", "xterm-256color"),
        ("COLORTERM", "truecolor"),
        ("LANG", "en_US.UTF-8"),
        ("LC_ALL", "en_US.UTF-8"),
    ]
}

/// One forked shell (or tmux attach) behind one pseudo-terminal file
/// descriptor.
pub struct PtySession {
    pub id: SessionId,
    pub working_dir: String,
    pub tmux_name: Option<String>,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
    attached: Mutex<Option<UnboundedSender<PtyEvent>>>,
    last_disconnected_at: Mutex<Option<Instant>>,
    terminated: AtomicBool,
    /// Set when the read pump panics, so `write` can stop feeding a
    /// shell nothing is draining anymore. Shared via `Arc` so the pump
    /// thread can mark it without borrowing the session.
    broken: Arc<AtomicBool>,
    /// Bumped on every detach/reattach so a stale read-pump thread can
    /// tell its output is no longer wanted and exit without closing the
    /// fd (see `attach`). Shared via `Arc` so the pump thread can hold
    /// its own handle without borrowing the session.
    generation: Arc<AtomicU64>,
}

impl PtySession {
    /// Fork a shell (or exec the tmux command built by the tmux
    /// coordinator) behind a fresh pseudo-terminal.
    pub fn spawn(
        id: SessionId,
        working_dir: &str,
        cols: u16,
        rows: u16,
        tmux_name: Option<String>,
        tmux_command: Option<&str>,
    ) -> Result<Self, ServerError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ServerError::SpawnFailed(std::io::Error::other(e)))?;

        let mut cmd = match tmux_command {
            Some(shell_cmd) => {
                let mut cmd = CommandBuilder::new("/bin/sh");
                cmd.arg("-c");
                cmd.arg(shell_cmd);
                cmd
            }
            None => {
                let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
                let mut cmd = CommandBuilder::new(&shell);
                // portable-pty does not expose a raw argv[0] override, so
                // a login-shell invocation is requested the conventional
                // way instead of the dash-prefixed argv[0] trick.
                cmd.arg("-l");
                cmd
            }
        };
        if Path::new(working_dir).is_dir() {
            cmd.cwd(working_dir);
        }
        for (key, value) in base_env() {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ServerError::SpawnFailed(std::io::Error::other(e)))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ServerError::SpawnFailed(std::io::Error::other(e)))?;

        Ok(Self {
            id,
            working_dir: working_dir.to_string(),
            tmux_name,
            master: Mutex::new(Some(pair.master)),
            writer: Mutex::new(Some(writer)),
            child: Mutex::new(Some(child)),
            attached: Mutex::new(None),
            last_disconnected_at: Mutex::new(None),
            terminated: AtomicBool::new(false),
            broken: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// `orphaned = attached handle is null AND terminated is false`.
    pub fn is_orphaned(&self) -> bool {
        !self.is_terminated() && self.attached.lock().is_none()
    }

    pub fn last_disconnected_at(&self) -> Option<Instant> {
        *self.last_disconnected_at.lock()
    }

    /// Bind a client and start a background read pump. Any previous pump
    /// is invalidated (not joined — it may be blocked in a `read()` with
    /// no data pending) via the generation counter.
    pub fn attach(&self, sink: UnboundedSender<PtyEvent>) {
        *self.last_disconnected_at.lock() = None;
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.attached.lock() = Some(sink.clone());

        let reader = {
            let guard = self.master.lock();
            match guard.as_ref() {
                Some(master) => master.try_clone_reader(),
                None => return,
            }
        };
        let mut reader = match reader {
            Ok(r) => r,
            Err(e) => {
                warn!("failed to clone pty reader for session: {e}");
                let _ = sink.send(PtyEvent::Exited);
                return;
            }
        };

        let generation = Arc::clone(&self.generation);
        let broken = Arc::clone(&self.broken);
        let id = self.id.clone();
        std::thread::spawn(move || {
            let panic_sink = sink.clone();
            let panic_id = id.clone();
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| {
                read_pump(reader, &sink, &generation, my_generation);
            })) {
                error!("pty read pump panicked for session {panic_id}: {}", format_panic(&*panic));
                broken.store(true, Ordering::SeqCst);
                let _ = panic_sink.send(PtyEvent::Exited);
            }
        });
    }

    /// Write raw input to the shell. Short writes are accepted as
    /// best-effort and not retried.
    pub fn write(&self, text: &str) {
        if self.broken.load(Ordering::SeqCst) {
            return;
        }
        if let Some(writer) = self.writer.lock().as_mut() {
            if let Err(e) = writer.write_all(text.as_bytes()) {
                warn!("pty write failed for session {}: {e}", self.id);
            }
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        if let Some(master) = self.master.lock().as_ref() {
            if let Err(e) = master.resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            }) {
                warn!("pty resize failed for session {}: {e}", self.id);
            }
        }
    }

    /// Stop the read pump and clear the client handle without closing
    /// the fd.
    pub fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.attached.lock() = None;
        *self.last_disconnected_at.lock() = Some(Instant::now());
    }

    /// Stop the current pump, bind a new client, start a fresh pump.
    /// Output buffered between detach and reattach is lost.
    pub fn reattach(&self, sink: UnboundedSender<PtyEvent>) {
        self.attach(sink);
    }

    /// Idempotent teardown: kill the child, reap it on a background
    /// thread, close the master fd exactly once.
    pub fn terminate(&self) {
        if self
            .terminated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.attached.lock() = None;

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill() {
                debug!("pty child already gone for session {}: {e}", self.id);
            }
            // Reap asynchronously so `terminate` never blocks its caller.
            let id = self.id.clone();
            std::thread::spawn(move || {
                if let Ok(status) = child.wait() {
                    debug!("session {id} child reaped: {status:?}");
                }
            });
        }

        self.writer.lock().take();
        self.master.lock().take();
    }
}

fn read_pump(
    mut reader: Box<dyn Read + Send>,
    sink: &UnboundedSender<PtyEvent>,
    generation: &AtomicU64,
    my_generation: u64,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = sink.send(PtyEvent::Exited);
                break;
            }
            Ok(n) => {
                if generation.load(Ordering::SeqCst) != my_generation {
                    debug!("pty read pump stopping (superseded by reattach)");
                    break;
                }
                let text = decode_lossy(&buf[..n]);
                if sink.send(PtyEvent::Output(text)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(_) => {
                let _ = sink.send(PtyEvent::Exited);
                break;
            }
        }
    }
}

/// UTF-8 decode with a byte-for-codepoint Latin-1 fallback so no bytes
/// are ever dropped.
fn decode_lossy(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_lossy_passes_through_valid_utf8() {
        assert_eq!(decode_lossy("hello".as_bytes()), "hello");
    }

    #[test]
    fn decode_lossy_falls_back_to_latin1_on_invalid_utf8() {
        let bytes = [0xff, 0x41];
        let decoded = decode_lossy(&bytes);
        assert_eq!(decoded.chars().next(), Some('\u{ff}'));
        assert_eq!(decoded.chars().nth(1), Some('A'));
    }
}
