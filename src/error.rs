//! Error types for the reputation core.

use thiserror::Error;

/// Main error type for reputation operations.
#[derive(Debug, Error)]
pub enum ReputeError {
    /// Malformed caller input, raised before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A failure from the underlying ledger collaborator.
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for reputation operations.
pub type Result<T> = std::result::Result<T, ReputeError>;
