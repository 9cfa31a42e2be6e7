use std::net::IpAddr;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 4848;

/// Remote-access server configuration, read once at startup.
///
/// Three settings: an enablement flag, the listen port, and a tmux-mode
/// flag influencing how the host spawns panel shells. This is not
/// persisted by the core — the host application owns settings storage;
/// this struct only describes what the core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub enabled: bool,
    pub port: u16,
    pub tmux_mode: bool,
    pub bind_addr: IpAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_PORT,
            tmux_mode: false,
            bind_addr: "0.0.0.0".parse().expect("valid IP literal"),
        }
    }
}

impl Config {
    /// Read configuration from `CMUX_REMOTE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            enabled: parse_bool_env("CMUX_REMOTE_ENABLED").unwrap_or(default.enabled),
            port: std::env::var("CMUX_REMOTE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
            tmux_mode: parse_bool_env("CMUX_REMOTE_TMUX").unwrap_or(default.tmux_mode),
            bind_addr: std::env::var("CMUX_REMOTE_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.bind_addr),
        }
    }
}

fn parse_bool_env(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_disabled_with_standard_port() {
        let cfg = Config::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.port, 4848);
        assert!(!cfg.tmux_mode);
    }

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        // SAFETY: tests in this module run serially enough that this
        // env var isn't read concurrently elsewhere.
        unsafe { std::env::set_var("CMUX_REMOTE_TEST_BOOL", "Yes") };
        assert_eq!(parse_bool_env("CMUX_REMOTE_TEST_BOOL"), Some(true));
        unsafe { std::env::set_var("CMUX_REMOTE_TEST_BOOL", "0") };
        assert_eq!(parse_bool_env("CMUX_REMOTE_TEST_BOOL"), Some(false));
        unsafe { std::env::remove_var("CMUX_REMOTE_TEST_BOOL") };
        assert_eq!(parse_bool_env("CMUX_REMOTE_TEST_BOOL"), None);
    }
}
