//! Error types for ceres-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for ceres-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ceres-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A required external tool (compiler) is not installed.
    #[error("{tool} not found. Please install {tool} or set CERES_CC.")]
    ToolNotFound { tool: String },

    /// The compiled program could not be started.
    #[error("failed to launch {}: {message}", path.display())]
    Launch { path: PathBuf, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The marker token cannot be embedded in the preamble.
    #[error("invalid marker token: {0}")]
    InvalidMarker(String),

    /// Execution was aborted by user request.
    #[error("execution aborted")]
    Aborted,
}
