//! Evicts stale processes holding the configured port before bind, by
//! enumerating listening ports per platform and inverting "ports owned
//! by a PID" into "PIDs owning a port".

use std::time::Duration;

use log::warn;

use crate::process::{command, safe_output};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const POLL_TIMEOUT: Duration = Duration::from_secs(3);
const BIND_ATTEMPTS: u32 = 3;
const BIND_RETRY_SLEEP: Duration = Duration::from_millis(500);

/// List PIDs currently holding `port` in LISTEN state, best-effort.
/// Errors from the listing facility (missing binary, non-zero exit) are
/// treated as "nothing found".
pub fn pids_holding_port(port: u16) -> Vec<u32> {
    #[cfg(target_os = "linux")]
    {
        list_via_ss(port)
    }
    #[cfg(target_os = "macos")]
    {
        list_via_lsof(port)
    }
    #[cfg(target_os = "windows")]
    {
        list_via_netstat(port)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

#[cfg(target_os = "linux")]
fn list_via_ss(port: u16) -> Vec<u32> {
    let Ok(out) = safe_output(command("ss").args(["-tlnp"])) else {
        return Vec::new();
    };
    if !out.status.success() {
        return Vec::new();
    }
    parse_ss_output(&String::from_utf8_lossy(&out.stdout), port)
}

#[cfg(target_os = "linux")]
fn parse_ss_output(text: &str, port: u16) -> Vec<u32> {
    let needle = format!(":{port} ");
    let mut pids = Vec::new();
    for line in text.lines() {
        if !line.contains(&needle) && !line.ends_with(&format!(":{port}")) {
            continue;
        }
        // users:(("proc",pid=1234,fd=3))
        if let Some(idx) = line.find("pid=") {
            let rest = &line[idx + 4..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(pid) = digits.parse() {
                pids.push(pid);
            }
        }
    }
    pids
}

#[cfg(target_os = "macos")]
fn list_via_lsof(port: u16) -> Vec<u32> {
    let Ok(out) = safe_output(command("lsof").args([
        "-iTCP",
        "-sTCP:LISTEN",
        "-P",
        "-n",
    ])) else {
        return Vec::new();
    };
    if !out.status.success() {
        return Vec::new();
    }
    parse_lsof_output(&String::from_utf8_lossy(&out.stdout), port)
}

#[cfg(target_os = "macos")]
fn parse_lsof_output(text: &str, port: u16) -> Vec<u32> {
    let needle = format!(":{port} ");
    let mut pids = Vec::new();
    for line in text.lines().skip(1) {
        if !line.contains(&needle) {
            continue;
        }
        let mut fields = line.split_whitespace();
        let _cmd = fields.next();
        if let Some(pid_str) = fields.next() {
            if let Ok(pid) = pid_str.parse() {
                pids.push(pid);
            }
        }
    }
    pids
}

#[cfg(target_os = "windows")]
fn list_via_netstat(port: u16) -> Vec<u32> {
    let Ok(out) = safe_output(command("netstat").args(["-ano"])) else {
        return Vec::new();
    };
    if !out.status.success() {
        return Vec::new();
    }
    parse_netstat_output(&String::from_utf8_lossy(&out.stdout), port)
}

#[cfg(target_os = "windows")]
fn parse_netstat_output(text: &str, port: u16) -> Vec<u32> {
    let needle = format!(":{port}");
    let mut pids = Vec::new();
    for line in text.lines() {
        if !line.contains("LISTENING") || !line.contains(&needle) {
            continue;
        }
        if let Some(pid_str) = line.split_whitespace().last() {
            if let Ok(pid) = pid_str.parse() {
                pids.push(pid);
            }
        }
    }
    pids
}

/// Kill `pid` immediately. SIGTERM is deliberately not used: the port
/// must be usable right away.
#[cfg(unix)]
fn kill_pid(pid: u32) {
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

#[cfg(windows)]
fn kill_pid(pid: u32) {
    let _ = safe_output(command("taskkill").args(["/F", "/PID", &pid.to_string()]));
}

/// Kill every foreign process holding `port`, then poll until the port is
/// free or `POLL_TIMEOUT` elapses. Synchronous and blocking by design:
/// called once before bind, off any async runtime.
pub fn release_port(port: u16, own_pid: u32) {
    let victims: Vec<u32> = pids_holding_port(port)
        .into_iter()
        .filter(|&pid| pid != own_pid)
        .collect();
    if victims.is_empty() {
        return;
    }
    for pid in &victims {
        kill_pid(*pid);
    }

    let deadline = std::time::Instant::now() + POLL_TIMEOUT;
    loop {
        let remaining: Vec<u32> = pids_holding_port(port)
            .into_iter()
            .filter(|&pid| pid != own_pid)
            .collect();
        if remaining.is_empty() {
            return;
        }
        if std::time::Instant::now() >= deadline {
            warn!("port {port} still held by {remaining:?} after {POLL_TIMEOUT:?}, giving up cleanup");
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Attempt to bind `addr` up to [`BIND_ATTEMPTS`] times with a sleep
/// between attempts. The caller decides how to construct the listener;
/// this just retries the whole closure.
pub fn bind_with_retries<T, E>(
    mut attempt: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut last_err = None;
    for i in 0..BIND_ATTEMPTS {
        match attempt() {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err = Some(e);
                if i + 1 < BIND_ATTEMPTS {
                    std::thread::sleep(BIND_RETRY_SLEEP);
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn parses_ss_listen_line_with_pid() {
        let sample = "LISTEN 0 128 0.0.0.0:4848 0.0.0.0:* users:((\"cmux-remote\",pid=4242,fd=7))\n";
        assert_eq!(parse_ss_output(sample, 4848), vec![4242]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn ignores_unrelated_ports() {
        let sample = "LISTEN 0 128 0.0.0.0:22 0.0.0.0:* users:((\"sshd\",pid=1,fd=3))\n";
        assert!(parse_ss_output(sample, 4848).is_empty());
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn parses_lsof_listen_line() {
        let sample = "COMMAND   PID   USER   FD   TYPE DEVICE SIZE/OFF NODE NAME\ncmux-remo 4242  root   7u   IPv4  0x0   0t0      TCP *:4848 (LISTEN)\n";
        assert_eq!(parse_lsof_output(sample, 4848), vec![4242]);
    }

    #[test]
    fn bind_with_retries_succeeds_on_second_try() {
        let mut calls = 0;
        let result: Result<u32, &str> = bind_with_retries(|| {
            calls += 1;
            if calls < 2 {
                Err("busy")
            } else {
                Ok(7)
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 2);
    }

    #[test]
    fn bind_with_retries_reports_final_failure() {
        let result: Result<(), &str> = bind_with_retries(|| Err("busy"));
        assert_eq!(result, Err("busy"));
    }

    #[test]
    fn release_port_is_idempotent_when_nothing_to_kill() {
        // No listener bound on this port in test environments; must return
        // promptly rather than spinning the full poll timeout.
        let start = std::time::Instant::now();
        release_port(0, std::process::id());
        assert!(start.elapsed() < POLL_TIMEOUT);
    }
}
