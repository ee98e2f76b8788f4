//! Error types for the Ceres server.

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// IO error, typically binding a listener.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ceres core error.
    #[error("Core error: {0}")]
    Core(#[from] ceres_core::Error),

    /// A submission is already running.
    #[error("Execution already in progress")]
    ExecutionInProgress,

    /// Interrupt requested with nothing running.
    #[error("No execution in progress")]
    NothingRunning,

    /// The configured address does not parse.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
