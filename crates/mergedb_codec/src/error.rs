//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
///
/// Every variant describes rejected input. None of them indicate a bug in
/// the codec, so callers are expected to surface them as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before a complete item could be read.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the item requires.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// A length-prefixed item does not fit its one-byte prefix.
    #[error("{what} too long: {len} bytes, at most {max} allowed")]
    TooLong {
        /// Which item overflowed.
        what: &'static str,
        /// Actual length.
        len: usize,
        /// Maximum length.
        max: usize,
    },

    /// A hash field violates the active scheme's grammar.
    #[error("invalid field: {message}")]
    InvalidField {
        /// Description of the violation.
        message: String,
    },

    /// A hash value cannot be represented by the active scheme.
    #[error("invalid value: {message}")]
    InvalidValue {
        /// Description of the violation.
        message: String,
    },

    /// The bytes do not follow the expected layout.
    #[error("malformed input: {message}")]
    Malformed {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Create a truncation error.
    #[must_use]
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    /// Create an invalid field error.
    pub fn invalid_field(message: impl Into<String>) -> Self {
        Self::InvalidField {
            message: message.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Create a malformed input error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}
