//! Merge operator for hash values.
//!
//! Every `hset`/`hdel` is written as a merge operand holding one or more
//! records. Reads and compaction resolve the pending operands against the
//! stored value:
//!
//! - **Full merge** walks the operands newest first and then the base
//!   value. The first occurrence of a field wins; deleted fields are
//!   dropped from the result.
//! - **Partial merge** combines two adjacent operands without the base.
//!   The newer operand wins and tombstones are kept, so the combined
//!   operand still hides the field in whatever base it is later merged
//!   into.

use mergedb_codec::{CodecResult, HashEncoder, HashRecord, HashScheme};
use mergedb_storage::{MergeError, MergeOperator};
use std::collections::HashSet;

/// Resolves hash merge operands in one [`HashScheme`].
#[derive(Debug, Clone)]
pub struct HashMergeOperator {
    encoder: HashEncoder,
    name: String,
}

impl HashMergeOperator {
    /// Creates the operator for the encoder's scheme.
    #[must_use]
    pub fn new(encoder: HashEncoder) -> Self {
        Self {
            name: Self::name_for(encoder.scheme()),
            encoder,
        }
    }

    /// Returns the persisted operator name for a scheme.
    #[must_use]
    pub fn name_for(scheme: HashScheme) -> String {
        format!("mergedb.hash.{}.v1", scheme.name())
    }

    /// Returns the encoder.
    #[must_use]
    pub fn encoder(&self) -> &HashEncoder {
        &self.encoder
    }

    /// Collects records from `layers`, newest layer first, keeping the first
    /// occurrence of each field.
    fn collect<'a>(
        &self,
        layers: impl IntoIterator<Item = &'a [u8]>,
        keep_tombstones: bool,
    ) -> CodecResult<Vec<HashRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for layer in layers {
            for record in self.encoder.decode_values(layer)? {
                if !seen.insert(record.field.clone()) {
                    continue;
                }
                if keep_tombstones || !self.encoder.is_deleted(&record.value) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

impl MergeOperator for HashMergeOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_merge(
        &self,
        _key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Result<Vec<u8>, MergeError> {
        let layers = operands.iter().rev().map(Vec::as_slice).chain(existing);
        let records = self
            .collect(layers, false)
            .map_err(|err| MergeError::new(format!("undecodable hash record: {err}")))?;
        self.encoder
            .encode_records(&records)
            .map_err(|err| MergeError::new(format!("cannot re-encode merged hash: {err}")))
    }

    fn partial_merge(&self, _key: &[u8], left: &[u8], right: &[u8]) -> Option<Vec<u8>> {
        let records = self.collect([right, left], true).ok()?;
        self.encoder.encode_records(&records).ok()
    }
}
