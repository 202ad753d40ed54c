//! Error types for the Tether engine.

use crate::RecordId;
use thiserror::Error;

/// All possible errors from the Tether engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Record errors
    #[error("record already canonical: {0}")]
    AlreadyCanonical(RecordId),

    #[error("duplicate record id: {0}")]
    DuplicateRecord(RecordId),

    // Queue errors
    #[error("duplicate queue item: {0}")]
    DuplicateQueueItem(RecordId),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
