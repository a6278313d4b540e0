//! Error types for MergeDB core.

use mergedb_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in MergeDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage engine error.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Key, field or value rejected by the hash encoder.
    #[error("codec error: {0}")]
    Codec(#[from] mergedb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored hash value or pending operand could not be decoded.
    #[error("merge corruption on key {key}: {message}")]
    MergeCorruption {
        /// Hex rendering of the affected storage key.
        key: String,
        /// Description of the corruption.
        message: String,
    },

    /// The atomic write of a transaction failed; nothing was applied.
    #[error("commit failed: {source}")]
    CommitFailed {
        /// The engine error behind the failure.
        #[source]
        source: StorageError,
    },

    /// A retention pass could not delete its range.
    #[error("binlog trim failed: {message}")]
    TrimFailed {
        /// Description of the failure.
        message: String,
    },

    /// The log could not be opened or its trimmer could not start.
    #[error("startup failed: {message}")]
    StartupFailed {
        /// Description of the failure.
        message: String,
    },

    /// Replication log state broke one of its ordering rules.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the broken rule.
        message: String,
    },

    /// Database is already open or locked.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a commit failure.
    #[must_use]
    pub fn commit_failed(source: StorageError) -> Self {
        Self::CommitFailed { source }
    }

    /// Creates a trim failure.
    pub fn trim_failed(message: impl Into<String>) -> Self {
        Self::TrimFailed {
            message: message.into(),
        }
    }

    /// Creates a startup failure.
    pub fn startup_failed(message: impl Into<String>) -> Self {
        Self::StartupFailed {
            message: message.into(),
        }
    }

    /// Creates an invariant violation.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Operator failures reported by the engine surface as merge corruption.
impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MergeFailed { key, message } => Self::MergeCorruption { key, message },
            other => Self::Storage(other),
        }
    }
}
