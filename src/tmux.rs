//! Tmux session coordination.
//!
//! Names, creates, enumerates, and tears down tmux sessions so a native
//! terminal surface and a remote browser can mirror the same session.

use std::collections::HashMap;

use log::warn;
use parking_lot::Mutex;

use crate::process::{command, safe_output};
use crate::types::TmuxSession;

/// Prefix marking sessions this coordinator owns. Sessions without it are
/// never enumerated, killed, or listed.
pub const SESSION_PREFIX: &str = "at-";

/// Fixed probe list for locating the `tmux` binary, Homebrew/MacPorts
/// paths first.
const CANDIDATE_PATHS: &[&str] = &[
    "/opt/homebrew/bin/tmux",
    "/usr/local/bin/tmux",
    "/usr/bin/tmux",
];

/// Resolve the tmux binary path once at startup: probe the fixed list,
/// falling back to a bare `"tmux"` PATH-search sentinel if none exist.
pub fn resolve_tmux_path() -> String {
    for candidate in CANDIDATE_PATHS {
        if std::path::Path::new(candidate).is_file() {
            return candidate.to_string();
        }
    }
    "tmux".to_string()
}

/// Slugify a panel title the way `sessionName` does: spaces to `-`,
/// `.`/`:` to `_`, lowercased, truncated to 30 chars.
fn slugify(title: &str) -> String {
    let mut s: String = title
        .chars()
        .map(|c| match c {
            ' ' => '-',
            '.' | ':' => '_',
            c => c,
        })
        .collect::<String>()
        .to_lowercase();
    s.truncate(30);
    s
}

/// Deterministic tmux session name for a panel.
pub fn session_name(panel_id: &str, title: Option<&str>) -> String {
    match title {
        Some(title) => {
            let slug = slugify(title);
            let suffix: String = panel_id.chars().take(4).collect();
            format!("{SESSION_PREFIX}{slug}-{suffix}")
        }
        None => {
            let prefix: String = panel_id.chars().take(8).collect();
            format!("{SESSION_PREFIX}{prefix}")
        }
    }
}

/// Escape a string for embedding inside single quotes in a shell command
/// line: wrap in single quotes, escaping any embedded single quote as
/// `'\''`.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// In-memory `panelId -> tmuxName` registry, mutex-guarded. The lock is
/// never held across a subprocess call.
#[derive(Default)]
pub struct TmuxRegistry {
    tmux_path: String,
    names: Mutex<HashMap<String, String>>,
}

impl TmuxRegistry {
    pub fn new(tmux_path: String) -> Self {
        Self {
            tmux_path,
            names: Mutex::new(HashMap::new()),
        }
    }

    /// Build the shell-quoted "create or attach" command for a panel,
    /// reusing a previously-registered name if one exists so mirroring
    /// survives a restart.
    pub fn build_create_or_attach_command(
        &self,
        panel_id: &str,
        dir: Option<&str>,
        title: Option<&str>,
    ) -> String {
        let name = {
            let mut names = self.names.lock();
            names
                .entry(panel_id.to_string())
                .or_insert_with(|| session_name(panel_id, title))
                .clone()
        };
        self.build_create_or_attach_for_name(&name, dir, panel_id)
    }

    fn build_create_or_attach_for_name(&self, name: &str, dir: Option<&str>, panel_id: &str) -> String {
        let mut cmd = format!(
            "{tmux} new-session -A -s {name}",
            tmux = shell_escape(&self.tmux_path),
            name = shell_escape(name),
        );
        if let Some(dir) = dir {
            cmd.push_str(&format!(" -c {}", shell_escape(dir)));
        }
        cmd.push_str(&format!(
            " \\; set status off \\; set mouse on \\; setenv CMUX_SURFACE_ID {panel} \\; setenv CMUX_PANEL_ID {panel} \\; send-keys 'export CMUX_SURFACE_ID={panel_raw} CMUX_PANEL_ID={panel_raw}; clear' Enter",
            panel = shell_escape(panel_id),
            panel_raw = panel_id,
        ));
        cmd
    }

    /// Build a create-or-attach command for a tmux session named
    /// directly by the caller, rather than derived from a panel id (used
    /// by the PTY WebSocket's `init{tmux}` field, where the browser names
    /// an existing or to-be-created tmux session with no panel context to
    /// mint `CMUX_PANEL_ID` env vars from).
    pub fn build_create_or_attach_for_named_session(&self, name: &str, dir: Option<&str>) -> String {
        let mut cmd = format!(
            "{tmux} new-session -A -s {name}",
            tmux = shell_escape(&self.tmux_path),
            name = shell_escape(name),
        );
        if let Some(dir) = dir {
            cmd.push_str(&format!(" -c {}", shell_escape(dir)));
        }
        cmd.push_str(" \\; set status off \\; set mouse on");
        cmd
    }

    /// Build a pure-attach command for an already-known session name.
    pub fn build_attach_command(&self, name: &str) -> String {
        format!(
            "TERM=xterm-256color LANG=en_US.UTF-8 {tmux} attach -t {name}",
            tmux = shell_escape(&self.tmux_path),
            name = shell_escape(name),
        )
    }

    /// Enumerate active sessions owned by this coordinator. A non-zero
    /// exit or unreadable output yields an empty list.
    pub fn list_active_sessions(&self) -> Vec<TmuxSession> {
        let Ok(out) = safe_output(command(&self.tmux_path).args([
            "list-sessions",
            "-F",
            "#{session_name}\t#{session_created}\t#{session_windows}\t#{session_attached}\t#{pane_current_path}",
        ])) else {
            return Vec::new();
        };
        if !out.status.success() {
            return Vec::new();
        }
        parse_list_sessions(&String::from_utf8_lossy(&out.stdout))
    }

    /// `true` iff a tmux session named `name` exists.
    pub fn session_exists(&self, name: &str) -> bool {
        safe_output(command(&self.tmux_path).args(["has-session", "-t", name]))
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    pub fn kill_session(&self, name: &str) {
        if let Err(e) = safe_output(command(&self.tmux_path).args(["kill-session", "-t", name])) {
            warn!("failed to kill tmux session {name}: {e}");
        }
    }

    pub fn kill_all_sessions(&self) {
        for session in self.list_active_sessions() {
            self.kill_session(&session.name);
        }
    }

    /// Look up a previously-registered name for `panel_id`, without
    /// creating one.
    pub fn registered_name(&self, panel_id: &str) -> Option<String> {
        self.names.lock().get(panel_id).cloned()
    }
}

fn parse_list_sessions(text: &str) -> Vec<TmuxSession> {
    let mut sessions = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        let [name, created, windows, attached, path] = fields[..] else {
            continue;
        };
        if !name.starts_with(SESSION_PREFIX) {
            continue;
        }
        let (Ok(created), Ok(windows), Ok(attached)) =
            (created.parse(), windows.parse(), attached.parse())
        else {
            continue;
        };
        sessions.push(TmuxSession {
            name: name.to_string(),
            created,
            window_count: windows,
            attached_clients: attached,
            current_path: path.to_string(),
        });
    }
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_with_title_is_slugified_and_suffixed() {
        let name = session_name("abcd1234efgh", Some("My Project: Build.Test"));
        assert_eq!(name, "at-my-project_-build_test-abcd");
    }

    #[test]
    fn session_name_without_title_uses_id_prefix() {
        let name = session_name("abcd1234efgh", None);
        assert_eq!(name, "at-abcd1234");
    }

    #[test]
    fn shell_escape_wraps_and_escapes_single_quotes() {
        assert_eq!(shell_escape("a b"), "'a b'");
        assert_eq!(shell_escape("it's"), r"'it'\''s'");
    }

    #[test]
    fn parse_list_sessions_filters_unprefixed_names() {
        let text = "at-foo\t1700000000\t2\t1\t/tmp\nother\t1700000001\t1\t0\t/home\n";
        let sessions = parse_list_sessions(text);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "at-foo");
        assert_eq!(sessions[0].window_count, 2);
    }

    #[test]
    fn registry_reuses_name_across_calls() {
        let registry = TmuxRegistry::new("tmux".to_string());
        let cmd1 = registry.build_create_or_attach_command("panel1", Some("/tmp"), Some("Demo"));
        let name1 = registry.registered_name("panel1").unwrap();
        let cmd2 = registry.build_create_or_attach_command("panel1", Some("/tmp"), Some("Different Title"));
        let name2 = registry.registered_name("panel1").unwrap();
        assert_eq!(name1, name2);
        assert!(cmd1.contains(&name1));
        assert!(cmd2.contains(&name2));
    }
}
