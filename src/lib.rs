//! Embedded remote-access server for a multi-workspace terminal application.
//!
//! Exposes interactive terminal panels to any browser on the local network
//! as PTY WebSocket sessions, alongside a small REST surface and a
//! state-broadcast WebSocket channel. See `SPEC_FULL.md` for the full
//! component breakdown.

pub mod bridge;
pub mod broadcaster;
pub mod config;
pub mod error;
pub mod host;
pub mod http;
pub mod port_cleanup;
pub mod process;
pub mod pty;
pub mod server;
pub mod tmux;
pub mod types;

pub use config::Config;
pub use error::ServerError;
pub use server::RemoteServer;
