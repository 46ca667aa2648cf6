use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the storage pool
#[derive(Error, Debug)]
pub enum PoolError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Catalog outcomes surfaced as failures
    #[error("Unknown cleaner: {0}")]
    UnknownCleaner(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Transport errors
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Call {operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for PoolError
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Failures that mean the link to the coordinator is unusable.
    ///
    /// Workers restart their whole session on these; everything else is a
    /// catalog outcome the caller is expected to handle.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PoolError::Transport(_)
                | PoolError::Timeout { .. }
                | PoolError::WebSocket(_)
                | PoolError::Io(_)
        )
    }
}

/// Error categories that survive a trip across the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    UnknownCleaner,
    NotFound,
    Validation,
    Protocol,
    Internal,
}

/// Serializable error carried in a reply envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl From<&PoolError> for RemoteError {
    fn from(err: &PoolError) -> Self {
        let (kind, message) = match err {
            PoolError::UnknownCleaner(id) => (RemoteErrorKind::UnknownCleaner, id.clone()),
            PoolError::NotFound(what) => (RemoteErrorKind::NotFound, what.clone()),
            PoolError::Validation(msg) => (RemoteErrorKind::Validation, msg.clone()),
            PoolError::Protocol(msg) => (RemoteErrorKind::Protocol, msg.clone()),
            PoolError::Json(e) => (RemoteErrorKind::Protocol, e.to_string()),
            other => (RemoteErrorKind::Internal, other.to_string()),
        };
        Self { kind, message }
    }
}

impl From<RemoteError> for PoolError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            RemoteErrorKind::UnknownCleaner => PoolError::UnknownCleaner(err.message),
            RemoteErrorKind::NotFound => PoolError::NotFound(err.message),
            RemoteErrorKind::Validation => PoolError::Validation(err.message),
            RemoteErrorKind::Protocol => PoolError::Protocol(err.message),
            RemoteErrorKind::Internal => PoolError::Internal(err.message),
        }
    }
}
