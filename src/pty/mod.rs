//! PTY session and PTY manager: one forked shell per pseudo-terminal,
//! and the registry that tracks, attaches, and reaps them.

pub mod manager;
pub mod session;

pub use manager::PtyManager;
pub use session::{PtySession, SessionId};
