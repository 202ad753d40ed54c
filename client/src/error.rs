//! Error types for the sync client.

use tether_engine::RecordId;

/// Failure of the local durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt store: {0}")]
    Corrupt(#[from] tether_engine::Error),
}

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] tether_engine::Error),

    #[error("record is not queued: {0}")]
    NotQueued(RecordId),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
