//! Error types for Tandem endpoints.

use std::path::PathBuf;

/// Result type alias for Tandem operations.
pub type Result<T> = std::result::Result<T, TandemError>;

/// Main error type for Tandem endpoints.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    /// I/O failure on a specific node, keyed by its canonical path
    #[error("Storage error on {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Node does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The storage root could not be reached when building an endpoint
    #[error("Unreachable block storage {}: {source}", root.display())]
    Unreachable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registering with the OS notification source failed
    #[error("Failed to subscribe to {path}: {reason}")]
    Subscription { path: String, reason: String },

    /// The OS notification source reported a failure while running
    #[error("Notification error: {0}")]
    Notification(String),

    /// A session is already active on this sub-path
    #[error("Already watching {0}")]
    AlreadyWatching(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TandemError {
    /// Wrap an I/O error with the canonical path it concerns.
    ///
    /// A `NotFound` I/O error becomes [`TandemError::NotFound`] so callers can
    /// match on absence without digging into the source.
    pub fn storage(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path);
        }
        Self::Storage { path, source }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new subscription error
    pub fn subscription(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Subscription {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
