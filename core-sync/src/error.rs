use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The durable queue could not be read or written; the operation was not queued.
    #[error("Queue storage error: {0}")]
    Storage(String),

    #[error("Corrupted queue record under '{key}': {message}")]
    Corrupted { key: String, message: String },

    /// The backend refused the operation; it is never queued.
    #[error("Operation rejected by backend: {0}")]
    Rejected(String),

    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),

    #[error("Invalid operation kind: {0}")]
    InvalidKind(String),

    #[error("Invalid sync configuration: {0}")]
    Config(String),
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
