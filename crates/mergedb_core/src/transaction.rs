//! Transactions pairing data writes with replication log entries.
//!
//! A transaction stages data ops and log entries in one engine batch and
//! applies them with a single atomic write. Only one transaction per log is
//! open at a time; sequence numbers are handed out under that lock, so
//! committed sequences are gap-free and strictly increasing.

use crate::binlog::ReplicationLog;
use crate::error::{CoreError, CoreResult};
use mergedb_codec::{encode_seq_key, BinlogCommand, BinlogKind, LogEntry};
use mergedb_storage::{ColumnFamily, WriteBatch};
use parking_lot::MutexGuard;
use tracing::debug;

/// An open transaction on a [`ReplicationLog`].
///
/// Obtained from [`ReplicationLog::begin`]. Dropping it without calling
/// [`Transaction::commit`] discards everything staged.
pub struct Transaction<'a> {
    log: &'a ReplicationLog,
    _guard: MutexGuard<'a, ()>,
    pending_seq: u64,
    batch: WriteBatch,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(log: &'a ReplicationLog, guard: MutexGuard<'a, ()>, pending_seq: u64) -> Self {
        Self {
            log,
            _guard: guard,
            pending_seq,
            batch: WriteBatch::new(),
            finished: false,
        }
    }

    /// Stages a write of `value` under data key `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.batch.put(ColumnFamily::DEFAULT, key, value);
    }

    /// Stages a merge operand for data key `key`.
    pub fn merge(&mut self, key: &[u8], operand: &[u8]) {
        self.batch.merge(ColumnFamily::DEFAULT, key, operand);
    }

    /// Stages a delete of data key `key`.
    pub fn delete(&mut self, key: &[u8]) {
        self.batch.delete(ColumnFamily::DEFAULT, key);
    }

    /// Stages a log entry at the next sequence.
    ///
    /// Does nothing when the log is disabled.
    pub fn add_log(&mut self, kind: BinlogKind, command: BinlogCommand, key: &[u8]) {
        if !self.log.is_enabled() {
            return;
        }
        self.pending_seq += 1;
        let entry = LogEntry::new(self.pending_seq, kind, command, key);
        self.batch.put(
            self.log.column_family(),
            &encode_seq_key(self.pending_seq),
            entry.as_bytes(),
        );
    }

    /// Returns the sequence the last staged entry will get.
    #[must_use]
    pub fn pending_seq(&self) -> u64 {
        self.pending_seq
    }

    /// Returns the number of staged ops, log entries included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Returns true if nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Applies everything staged in one atomic write and returns the new
    /// `last_seq`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CommitFailed` if the engine write fails. In that
    /// case neither the data ops nor the log entries are applied and
    /// `last_seq` is unchanged.
    pub fn commit(mut self) -> CoreResult<u64> {
        self.log
            .engine()
            .write(&self.batch)
            .map_err(CoreError::commit_failed)?;
        self.finished = true;
        self.log.publish(self.pending_seq)?;
        Ok(self.pending_seq)
    }

    /// Discards everything staged.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if !self.finished {
            self.finished = true;
            debug!(
                ops = self.batch.len(),
                pending_seq = self.pending_seq,
                "transaction rolled back"
            );
            self.batch.clear();
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::BINLOG_COLUMN_FAMILY;
    use crate::config::BinlogConfig;
    use mergedb_storage::{Engine, EngineOptions};
    use std::sync::Arc;
    use std::time::Duration;

    fn open(config: BinlogConfig) -> (Arc<Engine>, ReplicationLog) {
        let options = EngineOptions::default().with_column_family(BINLOG_COLUMN_FAMILY);
        let engine = Arc::new(Engine::open_in_memory(options).unwrap());
        let config = config.trim_interval(Duration::from_secs(3600));
        let log = ReplicationLog::open(Arc::clone(&engine), config).unwrap();
        (engine, log)
    }

    #[test]
    fn commit_applies_data_and_log() {
        let (engine, log) = open(BinlogConfig::default());

        let mut txn = log.begin();
        txn.put(b"k1", b"v1");
        txn.add_log(BinlogKind::Sync, BinlogCommand::KSet, b"k1");
        txn.put(b"k2", b"v2");
        txn.add_log(BinlogKind::Sync, BinlogCommand::KSet, b"k2");
        assert_eq!(txn.pending_seq(), 2);
        assert_eq!(txn.len(), 4);
        assert_eq!(txn.commit().unwrap(), 2);

        assert_eq!(engine.get(ColumnFamily::DEFAULT, b"k2").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(log.last_seq(), 2);
        assert_eq!(log.get(1).unwrap().unwrap().key(), b"k1");
    }

    #[test]
    fn rollback_and_drop_discard() {
        let (engine, log) = open(BinlogConfig::default());

        let mut txn = log.begin();
        txn.put(b"k", b"v");
        txn.add_log(BinlogKind::Sync, BinlogCommand::KSet, b"k");
        txn.rollback();

        {
            let mut txn = log.begin();
            txn.delete(b"k");
            txn.add_log(BinlogKind::Sync, BinlogCommand::KDel, b"k");
        }

        assert_eq!(engine.get(ColumnFamily::DEFAULT, b"k").unwrap(), None);
        assert_eq!(log.last_seq(), 0);
        assert!(log.get(1).unwrap().is_none());

        let mut txn = log.begin();
        txn.add_log(BinlogKind::Sync, BinlogCommand::KSet, b"k");
        assert_eq!(txn.commit().unwrap(), 1);
    }

    #[test]
    fn disabled_log_still_writes_data() {
        let (engine, log) = open(BinlogConfig::default().enabled(false));

        let mut txn = log.begin();
        txn.put(b"k", b"v");
        txn.add_log(BinlogKind::Sync, BinlogCommand::KSet, b"k");
        assert_eq!(txn.len(), 1);
        assert_eq!(txn.commit().unwrap(), 0);

        assert_eq!(engine.get(ColumnFamily::DEFAULT, b"k").unwrap(), Some(b"v".to_vec()));
        assert!(log.find_last().unwrap().is_none());
    }

    #[test]
    fn empty_commit_keeps_sequence() {
        let (_engine, log) = open(BinlogConfig::default());
        let txn = log.begin();
        assert!(txn.is_empty());
        assert_eq!(txn.commit().unwrap(), 0);
        assert_eq!(log.last_seq(), 0);
    }

    #[test]
    fn concurrent_commits_get_distinct_sequences() {
        let (_engine, log) = open(BinlogConfig::default());
        let log = Arc::new(log);

        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    (0..25u8)
                        .map(|i| {
                            let mut txn = log.begin();
                            txn.add_log(BinlogKind::Sync, BinlogCommand::KSet, &[t, i]);
                            txn.commit().unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=100).collect::<Vec<_>>());
        assert_eq!(log.last_seq(), 100);
    }
}
