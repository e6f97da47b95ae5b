use thiserror::Error;

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Error taxonomy for the coordinator.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("report from unregistered client: {0}")]
    UnregisteredClient(String),

    #[error("session closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
