//! Atomic write batches.

use crate::error::{StorageError, StorageResult};

/// Index of a column family inside an engine.
///
/// Obtained from [`crate::Engine::column_family`]; index 0 is always the
/// default family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnFamily(u8);

impl ColumnFamily {
    /// The default column family.
    pub const DEFAULT: Self = Self(0);

    pub(crate) const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Returns the index of this family.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Overwrite the value of a key.
    Put {
        /// Target family.
        cf: ColumnFamily,
        /// Key bytes.
        key: Vec<u8>,
        /// New value.
        value: Vec<u8>,
    },
    /// Record a merge operand for a key.
    Merge {
        /// Target family.
        cf: ColumnFamily,
        /// Key bytes.
        key: Vec<u8>,
        /// Operand handed to the merge operator later.
        operand: Vec<u8>,
    },
    /// Remove a key together with any pending operands.
    Delete {
        /// Target family.
        cf: ColumnFamily,
        /// Key bytes.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Returns the family this operation targets.
    #[must_use]
    pub fn cf(&self) -> ColumnFamily {
        match self {
            Self::Put { cf, .. } | Self::Merge { cf, .. } | Self::Delete { cf, .. } => *cf,
        }
    }

    /// Returns the key this operation targets.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Merge { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

const OP_PUT: u8 = 1;
const OP_MERGE: u8 = 2;
const OP_DELETE: u8 = 3;

/// An ordered group of writes applied all-or-nothing.
///
/// Operations are applied in insertion order, so a later operation on the
/// same key observes the earlier one.
///
/// # Wire format
///
/// ```text
/// | count(4) | op* |
/// op = | tag(1) | cf(1) | key_len(4) | key | [value_len(4) | value] |
/// ```
///
/// All integers are little-endian. Deletes carry no value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, cf: ColumnFamily, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put {
            cf,
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Queues a merge operand.
    pub fn merge(&mut self, cf: ColumnFamily, key: &[u8], operand: &[u8]) {
        self.ops.push(BatchOp::Merge {
            cf,
            key: key.to_vec(),
            operand: operand.to_vec(),
        });
    }

    /// Queues a delete.
    pub fn delete(&mut self, cf: ColumnFamily, key: &[u8]) {
        self.ops.push(BatchOp::Delete {
            cf,
            key: key.to_vec(),
        });
    }

    /// Drops every queued operation.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Returns the number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the queued operations in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns true if any operation is a merge.
    #[must_use]
    pub fn has_merges(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, BatchOp::Merge { .. }))
    }

    /// Encodes the batch for the journal.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.ops.len() as u32).to_le_bytes());
        for op in &self.ops {
            let (tag, value) = match op {
                BatchOp::Put { value, .. } => (OP_PUT, Some(value)),
                BatchOp::Merge { operand, .. } => (OP_MERGE, Some(operand)),
                BatchOp::Delete { .. } => (OP_DELETE, None),
            };
            buf.push(tag);
            buf.push(op.cf().0);
            put_bytes(&mut buf, op.key());
            if let Some(value) = value {
                put_bytes(&mut buf, value);
            }
        }
        buf
    }

    /// Decodes a batch written by [`WriteBatch::encode`].
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the bytes are truncated, carry
    /// an unknown tag or have trailing garbage.
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let mut reader = Reader { bytes, pos: 0 };
        let count = reader.u32()? as usize;
        let mut ops = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let tag = reader.u8()?;
            let cf = ColumnFamily(reader.u8()?);
            let key = reader.bytes()?;
            let op = match tag {
                OP_PUT => BatchOp::Put {
                    cf,
                    key,
                    value: reader.bytes()?,
                },
                OP_MERGE => BatchOp::Merge {
                    cf,
                    key,
                    operand: reader.bytes()?,
                },
                OP_DELETE => BatchOp::Delete { cf, key },
                other => {
                    return Err(StorageError::corrupted(format!(
                        "unknown batch op tag {other}"
                    )))
                }
            };
            ops.push(op);
        }
        if reader.pos != bytes.len() {
            return Err(StorageError::corrupted("trailing bytes after batch"));
        }
        Ok(Self { ops })
    }
}

fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> StorageResult<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| StorageError::corrupted("batch truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> StorageResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> StorageResult<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn bytes(&mut self) -> StorageResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}
