//! Merge operator contract.

use std::fmt;

/// Failure reported by a merge operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeError {
    message: String,
}

impl MergeError {
    /// Creates a merge error with the given reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MergeError {}

/// Combines pending merge operands into a value.
///
/// The engine records merge operands without reading the current value and
/// calls the operator lazily: on read, on compaction, and when the operand
/// list of a key grows past the configured limit.
///
/// # Contract
///
/// - `full_merge` receives operands **oldest first**
/// - `partial_merge(left, right)` is called with `left` older than `right`
///   and may decline by returning `None`
/// - `full_merge(base, [a, b])` must equal
///   `full_merge(base, [partial_merge(a, b)])` whenever the partial merge
///   succeeds
/// - `name` is persisted with the data; reopening with a different name is
///   refused
pub trait MergeOperator: Send + Sync {
    /// Stable identifier persisted in the journal header.
    fn name(&self) -> &str;

    /// Folds the existing value and all operands into the final value.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand or the existing value is malformed.
    fn full_merge(
        &self,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Result<Vec<u8>, MergeError>;

    /// Combines two adjacent operands into one, or declines.
    fn partial_merge(&self, key: &[u8], left: &[u8], right: &[u8]) -> Option<Vec<u8>>;
}
