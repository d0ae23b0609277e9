use thiserror::Error;

/// Errors surfaced by the interpreter loops and their handles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    /// The dispatcher (or the loop behind a handle) has stopped.
    #[error("interpreter has shut down")]
    Shutdown,

    /// A non-blocking submission found the queue full.
    #[error("submission queue is full")]
    QueueFull,

    /// The loop hit an unrecoverable condition and terminated.
    #[error("fatal interpreter error: {0}")]
    Fatal(String),
}

/// What an `Executor` reports when a command cannot produce its events.
#[derive(Error, Debug)]
pub enum ExecuteError {
    /// The command failed for a business reason. Becomes a failure event.
    #[error("{0:#}")]
    Domain(anyhow::Error),

    /// Dispatcher state can no longer be trusted.
    #[error("{0}")]
    Fatal(String),
}

impl ExecuteError {
    pub fn domain(err: impl Into<anyhow::Error>) -> Self {
        ExecuteError::Domain(err.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        ExecuteError::Fatal(reason.into())
    }
}
