use thiserror::Error;

/// Failures a streaming session can report.
///
/// Configuration errors are rejected synchronously and leave the session
/// `Idle`. Backend errors are transient: the session reverts to `Idle` and
/// the client may start again. Watchdog-driven channel rotation is not an
/// error at all and never surfaces here.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing or invalid start parameters
    #[error("invalid recognition config: {0}")]
    Config(String),

    /// Mid-stream backend failure
    #[error("speech backend error: {0}")]
    Backend(String),

    /// The session has been closed and no longer accepts events
    #[error("session is closed")]
    Closed,
}
