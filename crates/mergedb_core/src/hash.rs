//! Hash type handler.
//!
//! Writes never read the stored value: `hset`, `hmset` and `hdel` record a
//! merge operand and the engine resolves operands through
//! [`HashMergeOperator`](crate::HashMergeOperator) when the hash is read.
//! Each mutation and its replication log entry commit in one transaction.

use crate::binlog::ReplicationLog;
use crate::error::{CoreError, CoreResult};
use mergedb_codec::{
    hexmem, BinlogCommand, BinlogKind, CodecError, DataType, HashEncoder, HashRecord,
};
use mergedb_storage::{ColumnFamily, Engine};
use std::collections::HashSet;
use std::sync::Arc;

/// Reads and writes hash values.
#[derive(Debug, Clone)]
pub struct HashStore {
    engine: Arc<Engine>,
    log: Arc<ReplicationLog>,
    encoder: HashEncoder,
}

impl HashStore {
    /// Creates a handler over `engine`, logging through `log`.
    ///
    /// `encoder` must use the scheme of the engine's merge operator.
    #[must_use]
    pub fn new(engine: Arc<Engine>, log: Arc<ReplicationLog>, encoder: HashEncoder) -> Self {
        Self {
            engine,
            log,
            encoder,
        }
    }

    /// Returns the encoder.
    #[must_use]
    pub fn encoder(&self) -> &HashEncoder {
        &self.encoder
    }

    /// Sets one field.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidOperation` for an empty key or field or a
    /// value equal to the deletion marker, `CoreError::Codec` when the
    /// scheme cannot represent the input, and `CoreError::CommitFailed` if
    /// the write fails.
    pub fn hset(&self, key: &[u8], field: &[u8], value: &[u8], kind: BinlogKind) -> CoreResult<()> {
        self.hmset(key, &[HashRecord::new(field, value)], kind)
    }

    /// Sets several fields with one operand. A field named twice keeps its
    /// last value.
    ///
    /// # Errors
    ///
    /// See [`HashStore::hset`]. Nothing is written if any pair is rejected.
    pub fn hmset(&self, key: &[u8], pairs: &[HashRecord], kind: BinlogKind) -> CoreResult<()> {
        let storage_key = self.storage_key(key)?;
        if pairs.is_empty() {
            return Err(CoreError::invalid_operation("hmset needs at least one field"));
        }

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(pairs.len());
        for pair in pairs.iter().rev() {
            check_field(&pair.field)?;
            if self.encoder.is_deleted(&pair.value) {
                return Err(CoreError::invalid_operation(format!(
                    "value {:?} is reserved as the deletion marker",
                    hexmem(&pair.value)
                )));
            }
            if seen.insert(pair.field.as_slice()) {
                records.push(pair.clone());
            }
        }
        records.reverse();
        let operand = self.encoder.encode_records(&records)?;

        let mut txn = self.log.begin();
        txn.merge(&storage_key, &operand);
        txn.add_log(kind, BinlogCommand::HSet, &storage_key);
        txn.commit()?;
        Ok(())
    }

    /// Deletes one field.
    ///
    /// # Errors
    ///
    /// See [`HashStore::hset`].
    pub fn hdel(&self, key: &[u8], field: &[u8], kind: BinlogKind) -> CoreResult<()> {
        let storage_key = self.storage_key(key)?;
        check_field(field)?;
        let operand = self.encoder.encode_delete(field)?;

        let mut txn = self.log.begin();
        txn.merge(&storage_key, &operand);
        txn.add_log(kind, BinlogCommand::HDel, &storage_key);
        txn.commit()?;
        Ok(())
    }

    /// Deletes the whole hash. Returns the number of fields it had.
    ///
    /// A hash whose fields were all deleted still owns a storage key; it is
    /// removed too, and reported as zero fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the current value cannot be
    /// resolved or the write fails.
    pub fn hclear(&self, key: &[u8], kind: BinlogKind) -> CoreResult<usize> {
        let storage_key = self.storage_key(key)?;
        let Some(stored) = self.load(&storage_key)? else {
            return Ok(0);
        };
        let size = self
            .encoder
            .value_count(&stored)
            .map_err(|err| corruption(&storage_key, &err))?;

        let mut txn = self.log.begin();
        txn.delete(&storage_key);
        txn.add_log(kind, BinlogCommand::KDel, &storage_key);
        txn.commit()?;
        Ok(size)
    }

    /// Returns the value of one field.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MergeCorruption` if the stored value or a pending
    /// operand is undecodable, and a validation error for a bad key or field.
    pub fn hget(&self, key: &[u8], field: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        check_field(field)?;
        // Rejects fields the scheme cannot hold before touching storage.
        self.encoder.encode_delete(field)?;
        let storage_key = self.storage_key(key)?;
        let Some(stored) = self.load(&storage_key)? else {
            return Ok(None);
        };
        let value = self
            .encoder
            .find_value(&stored, field)
            .map_err(|err| corruption(&storage_key, &err))?;
        Ok(value.filter(|v| !self.encoder.is_deleted(v)))
    }

    /// Returns every live field of a hash.
    ///
    /// # Errors
    ///
    /// See [`HashStore::hget`].
    pub fn hgetall(&self, key: &[u8]) -> CoreResult<Vec<HashRecord>> {
        let storage_key = self.storage_key(key)?;
        let Some(stored) = self.load(&storage_key)? else {
            return Ok(Vec::new());
        };
        let mut records = self
            .encoder
            .decode_values(&stored)
            .map_err(|err| corruption(&storage_key, &err))?;
        records.retain(|r| !self.encoder.is_deleted(&r.value));
        Ok(records)
    }

    /// Returns the number of live fields of a hash.
    ///
    /// # Errors
    ///
    /// See [`HashStore::hget`].
    pub fn hsize(&self, key: &[u8]) -> CoreResult<usize> {
        let storage_key = self.storage_key(key)?;
        match self.load(&storage_key)? {
            Some(stored) => self
                .encoder
                .value_count(&stored)
                .map_err(|err| corruption(&storage_key, &err)),
            None => Ok(0),
        }
    }

    /// Lists hash names in `[start, end]`, at most `limit` of them.
    ///
    /// An empty `end` means no upper bound. Names are ordered by their
    /// storage key, so shorter names sort first. Hashes without live fields
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound is longer than 255 bytes or the scan
    /// fails.
    pub fn hlist(&self, start: &[u8], end: &[u8], limit: usize) -> CoreResult<Vec<Vec<u8>>> {
        let mut names = Vec::new();
        if limit == 0 {
            return Ok(names);
        }
        let start_key = self.encoder.encode_key(start)?;
        let end_key = if end.is_empty() {
            None
        } else {
            Some(self.encoder.encode_key(end)?)
        };

        let mut cursor = self.engine.cursor(ColumnFamily::DEFAULT)?;
        cursor.seek(&start_key)?;
        while let Some(key) = cursor.key() {
            if DataType::of_key(key) != Some(DataType::Hash) {
                break;
            }
            if end_key.as_deref().is_some_and(|end| key > end) {
                break;
            }
            let live = cursor
                .value()
                .map_or(Ok(0), |value| self.encoder.value_count(value))
                .map_err(|err| corruption(key, &err))?;
            if live > 0 {
                if let Ok(name) = self.encoder.decode_key(key) {
                    names.push(name);
                    if names.len() == limit {
                        break;
                    }
                }
            }
            cursor.next()?;
        }
        Ok(names)
    }

    /// Iterates over the live fields of a hash.
    ///
    /// The value is resolved once, when the iterator is created.
    ///
    /// # Errors
    ///
    /// See [`HashStore::hgetall`].
    pub fn hscan(&self, key: &[u8]) -> CoreResult<HashScan> {
        Ok(HashScan {
            records: self.hgetall(key)?.into_iter(),
        })
    }

    fn storage_key(&self, key: &[u8]) -> CoreResult<Vec<u8>> {
        if key.is_empty() {
            return Err(CoreError::invalid_operation("empty hash key"));
        }
        Ok(self.encoder.encode_key(key)?)
    }

    fn load(&self, storage_key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.engine.get(ColumnFamily::DEFAULT, storage_key)?)
    }
}

/// Iterator over the fields of one hash, from [`HashStore::hscan`].
#[derive(Debug)]
pub struct HashScan {
    records: std::vec::IntoIter<HashRecord>,
}

impl Iterator for HashScan {
    type Item = HashRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for HashScan {}

fn check_field(field: &[u8]) -> CoreResult<()> {
    if field.is_empty() {
        return Err(CoreError::invalid_operation("empty hash field"));
    }
    Ok(())
}

fn corruption(storage_key: &[u8], err: &CodecError) -> CoreError {
    CoreError::MergeCorruption {
        key: hexmem(storage_key),
        message: err.to_string(),
    }
}
