use thiserror::Error;

/// Error taxonomy for the remote-access server.
///
/// Client disconnects are ordinary state transitions, not errors, and have
/// no variant here — see the PTY manager's detach handling.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to start remote server: {0}")]
    StartupFailure(String),

    #[error("failed to spawn shell: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("command timed out waiting for a reply")]
    CommandTimeout,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("tmux is not available on this system")]
    TmuxUnavailable,
}
