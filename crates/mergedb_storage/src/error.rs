//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal is corrupted beyond the tolerated torn tail.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The engine has been closed.
    #[error("storage is closed")]
    Closed,

    /// A caller passed an argument the engine cannot act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The merge operator could not combine the pending operands of a key.
    #[error("merge failed for key {key}: {message}")]
    MergeFailed {
        /// Hex rendering of the key whose operands failed to merge.
        key: String,
        /// Reason reported by the operator.
        message: String,
    },

    /// The journal was written with a different merge operator.
    #[error("merge operator mismatch: journal uses {persisted:?}, options supply {supplied:?}")]
    OperatorMismatch {
        /// Operator name recorded in the journal header.
        persisted: Option<String>,
        /// Operator name supplied when opening.
        supplied: Option<String>,
    },
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
