//! Error types for RevGuard

use std::path::Path;

/// Result type alias using RevGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for RevGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Compliance mode outside of mild/standard/strict
    #[error("invalid compliance mode '{0}': expected one of mild, standard, strict")]
    InvalidComplianceMode(String),

    /// Score that is not a finite number
    #[error("invalid score: {0}")]
    InvalidScore(String),

    /// Configuration errors, including malformed rule-table updates
    #[error("configuration error: {0}")]
    Config(String),

    /// Audit trail errors
    #[error("audit error: {0}")]
    Audit(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new invalid score error
    pub fn invalid_score(msg: impl Into<String>) -> Self {
        Self::InvalidScore(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new audit error
    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit(msg.into())
    }

    /// Attach the path an IO error occurred on, keeping its kind
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }

    /// Whether the error was caused by the caller's input rather than
    /// the service itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidComplianceMode(_) | Self::InvalidScore(_) | Self::Config(_)
        )
    }
}
