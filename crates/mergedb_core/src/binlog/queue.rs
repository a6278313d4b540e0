//! The replication log and its shared state.

use super::trimmer::Trimmer;
use crate::config::BinlogConfig;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use mergedb_codec::{decode_seq_key, encode_seq_key, BinlogCommand, BinlogKind, LogEntry};
use mergedb_storage::{ColumnFamily, Cursor, Engine, WriteBatch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Name of the column family holding log entries.
pub const BINLOG_COLUMN_FAMILY: &str = "binlog";

/// State shared between the log and its trimmer thread.
pub(crate) struct LogState {
    engine: Arc<Engine>,
    cf: ColumnFamily,
    min_seq: AtomicU64,
    last_seq: AtomicU64,
    config: BinlogConfig,
}

impl LogState {
    pub(crate) fn config(&self) -> &BinlogConfig {
        &self.config
    }

    /// Runs one retention pass. Returns the number of deleted entries.
    pub(crate) fn trim_pass(&self) -> CoreResult<u64> {
        let min = self.min_seq.load(Ordering::SeqCst);
        let last = self.last_seq.load(Ordering::SeqCst);
        if last < min {
            error!(min, last, "binlog corrupted: last_seq below min_seq");
            return Err(CoreError::invariant_violation(format!(
                "binlog last_seq {last} is below min_seq {min}"
            )));
        }

        let capacity = self.config.capacity;
        if last - min < capacity.saturating_add(self.config.hysteresis) {
            return Ok(0);
        }

        let end = last - capacity;
        let deleted = self.delete_range(min, end, true).map_err(|err| {
            CoreError::trim_failed(format!("deleting binlog [{min}, {end}]: {err}"))
        })?;
        let left = last - self.min_seq.load(Ordering::SeqCst) + 1;
        info!(deleted, start = min, end, left, max = last, "trimmed binlog");
        Ok(deleted)
    }

    /// Deletes `[start, end]` in sub-batches of `trim_batch_size`.
    fn delete_range(&self, start: u64, end: u64, advance_min: bool) -> CoreResult<u64> {
        if start > end {
            return Ok(0);
        }
        let chunk = u64::try_from(self.config.trim_batch_size.max(1)).unwrap_or(u64::MAX);
        let mut next = start;
        let mut deleted = 0;
        loop {
            let chunk_end = end.min(next.saturating_add(chunk - 1));
            let mut batch = WriteBatch::new();
            for seq in next..=chunk_end {
                batch.delete(self.cf, &encode_seq_key(seq));
            }
            self.engine.write(&batch)?;
            deleted += chunk_end - next + 1;
            if advance_min {
                self.min_seq
                    .fetch_max(chunk_end.saturating_add(1), Ordering::SeqCst);
            }
            if chunk_end == end {
                return Ok(deleted);
            }
            next = chunk_end + 1;
        }
    }

    fn cursor(&self) -> CoreResult<Cursor<'_>> {
        Ok(self.engine.cursor(self.cf)?)
    }

    fn get(&self, seq: u64) -> CoreResult<Option<LogEntry>> {
        match self.engine.get(self.cf, &encode_seq_key(seq))? {
            Some(bytes) => self.load(seq, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Decodes the entry stored under `seq` and checks it carries that seq.
    fn load(&self, seq: u64, bytes: &[u8]) -> CoreResult<LogEntry> {
        let entry = LogEntry::decode(bytes)?;
        if entry.seq() != seq {
            error!(key = seq, stored = entry.seq(), "binlog corrupted: sequence mismatch");
            return Err(CoreError::invariant_violation(format!(
                "binlog entry under seq {seq} carries seq {}",
                entry.seq()
            )));
        }
        Ok(entry)
    }

    /// Returns the entry at the cursor, `None` off the end or on a foreign key.
    fn entry_at(&self, cursor: &Cursor<'_>) -> CoreResult<Option<LogEntry>> {
        let Some((key, value)) = cursor.entry() else {
            return Ok(None);
        };
        match decode_seq_key(key) {
            Some(seq) => self.load(seq, value).map(Some),
            None => Ok(None),
        }
    }
}

/// Point-in-time counters of a [`ReplicationLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinlogStats {
    /// Whether mutations are being logged.
    pub enabled: bool,
    /// Retained entry count.
    pub capacity: u64,
    /// Oldest retained sequence.
    pub min_seq: u64,
    /// Newest committed sequence.
    pub last_seq: u64,
}

impl fmt::Display for BinlogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    capacity : {}", self.capacity)?;
        writeln!(f, "    min_seq  : {}", self.min_seq)?;
        write!(f, "    max_seq  : {}", self.last_seq)
    }
}

/// A bounded, sequence-numbered log of committed mutations.
///
/// Entries live in their own column family under `[0x01][seq big-endian]`
/// keys. Every data write goes through a [`Transaction`] obtained from
/// [`ReplicationLog::begin`], which appends the data ops and the log entries
/// in one atomic engine batch.
///
/// When enabled, a background trimmer keeps `last_seq - min_seq` close to
/// the configured capacity.
///
/// # Example
///
/// ```rust
/// use mergedb_codec::{BinlogCommand, BinlogKind};
/// use mergedb_core::{BinlogConfig, ReplicationLog, BINLOG_COLUMN_FAMILY};
/// use mergedb_storage::{Engine, EngineOptions};
/// use std::sync::Arc;
///
/// let options = EngineOptions::default().with_column_family(BINLOG_COLUMN_FAMILY);
/// let engine = Arc::new(Engine::open_in_memory(options).unwrap());
/// let log = ReplicationLog::open(engine, BinlogConfig::default()).unwrap();
///
/// let mut txn = log.begin();
/// txn.put(b"k", b"v");
/// txn.add_log(BinlogKind::Sync, BinlogCommand::KSet, b"k");
/// assert_eq!(txn.commit().unwrap(), 1);
///
/// assert_eq!(log.last_seq(), 1);
/// assert_eq!(log.get(1).unwrap().unwrap().key(), b"k");
/// ```
pub struct ReplicationLog {
    state: Arc<LogState>,
    tx_lock: Mutex<()>,
    trimmer: Mutex<Option<Trimmer>>,
}

impl ReplicationLog {
    /// Opens the log over an engine that registers the
    /// [`BINLOG_COLUMN_FAMILY`] family.
    ///
    /// Recovers `last_seq` from the newest entry and places `min_seq` at the
    /// first entry within `capacity` of it, then starts the trimmer when the
    /// log is enabled.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StartupFailed` if the family is missing, the
    /// capacity is zero or the trimmer thread cannot be spawned, and any
    /// engine error raised while scanning.
    pub fn open(engine: Arc<Engine>, config: BinlogConfig) -> CoreResult<Self> {
        let cf = engine.column_family(BINLOG_COLUMN_FAMILY).ok_or_else(|| {
            CoreError::startup_failed(format!(
                "engine has no {BINLOG_COLUMN_FAMILY:?} column family"
            ))
        })?;
        if config.capacity == 0 {
            return Err(CoreError::startup_failed("binlog capacity must be at least 1"));
        }

        let state = Arc::new(LogState {
            engine,
            cf,
            min_seq: AtomicU64::new(0),
            last_seq: AtomicU64::new(0),
            config,
        });
        let log = Self {
            state,
            tx_lock: Mutex::new(()),
            trimmer: Mutex::new(None),
        };

        let last = log.find_last()?.map_or(0, |entry| entry.seq());
        let mut min = last.saturating_sub(config.capacity);
        if let Some(entry) = log.find_next(min)? {
            min = entry.seq();
        }
        log.state.last_seq.store(last, Ordering::SeqCst);
        log.state.min_seq.store(min, Ordering::SeqCst);

        if config.enabled {
            info!(
                capacity = config.capacity,
                min_seq = min,
                max_seq = last,
                "binlog opened"
            );
            *log.trimmer.lock() = Some(Trimmer::start(Arc::clone(&log.state))?);
        }
        Ok(log)
    }

    /// Starts a transaction.
    ///
    /// Blocks while another transaction on this log is open; the lock is
    /// held until the returned transaction is committed, rolled back or
    /// dropped.
    pub fn begin(&self) -> Transaction<'_> {
        let guard = self.tx_lock.lock();
        let pending_seq = self.state.last_seq.load(Ordering::SeqCst);
        Transaction::new(self, guard, pending_seq)
    }

    /// Returns the entry with sequence `seq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored entry is truncated or filed under the
    /// wrong sequence.
    pub fn get(&self, seq: u64) -> CoreResult<Option<LogEntry>> {
        self.state.get(seq)
    }

    /// Returns the first entry with sequence `>= seq`.
    ///
    /// # Errors
    ///
    /// See [`ReplicationLog::get`].
    pub fn find_next(&self, seq: u64) -> CoreResult<Option<LogEntry>> {
        if let Some(entry) = self.get(seq)? {
            return Ok(Some(entry));
        }
        let mut cursor = self.state.cursor()?;
        cursor.seek(&encode_seq_key(seq))?;
        self.state.entry_at(&cursor)
    }

    /// Returns the newest entry.
    ///
    /// # Errors
    ///
    /// See [`ReplicationLog::get`].
    pub fn find_last(&self) -> CoreResult<Option<LogEntry>> {
        let mut cursor = self.state.cursor()?;
        cursor.seek(&encode_seq_key(u64::MAX))?;
        if cursor.valid() {
            // u64::MAX is never allocated.
            cursor.prev()?;
        } else {
            cursor.seek_to_last()?;
        }
        self.state.entry_at(&cursor)
    }

    /// Returns the oldest retained sequence.
    #[must_use]
    pub fn min_seq(&self) -> u64 {
        self.state.min_seq.load(Ordering::SeqCst)
    }

    /// Returns the newest committed sequence.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.state.last_seq.load(Ordering::SeqCst)
    }

    /// Returns the retained entry count.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.state.config.capacity
    }

    /// Returns whether mutations are logged.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.config.enabled
    }

    /// Returns the log counters.
    #[must_use]
    pub fn stats(&self) -> BinlogStats {
        BinlogStats {
            enabled: self.is_enabled(),
            capacity: self.capacity(),
            min_seq: self.min_seq(),
            last_seq: self.last_seq(),
        }
    }

    /// Overwrites the entry at `seq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine write fails.
    pub fn update(
        &self,
        seq: u64,
        kind: BinlogKind,
        command: BinlogCommand,
        key: &[u8],
    ) -> CoreResult<()> {
        let entry = LogEntry::new(seq, kind, command, key);
        self.state
            .engine
            .put(self.state.cf, &encode_seq_key(seq), entry.as_bytes())?;
        Ok(())
    }

    /// Deletes the entry at `seq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine write fails.
    pub fn del(&self, seq: u64) -> CoreResult<()> {
        self.state
            .engine
            .delete(self.state.cf, &encode_seq_key(seq))?;
        Ok(())
    }

    /// Deletes every entry in `[start, end]` in sub-batches. Returns the
    /// number of sequences covered.
    ///
    /// # Errors
    ///
    /// Returns an error if a sub-batch fails; earlier sub-batches stay deleted.
    pub fn del_range(&self, start: u64, end: u64) -> CoreResult<u64> {
        self.state.delete_range(start, end, false)
    }

    /// Deletes the whole retained window `[min_seq, last_seq]`.
    ///
    /// # Errors
    ///
    /// See [`ReplicationLog::del_range`].
    pub fn flush(&self) -> CoreResult<u64> {
        self.del_range(self.min_seq(), self.last_seq())
    }

    /// Runs one retention pass in the caller's thread.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::TrimFailed` if a delete fails and
    /// `CoreError::InvariantViolation` if `last_seq < min_seq`.
    pub fn trim(&self) -> CoreResult<u64> {
        self.state.trim_pass()
    }

    /// Deletes entries older than `min_seq` that retention left behind,
    /// walking backward from `min_seq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan or a delete fails.
    pub fn clean_obsolete(&self) -> CoreResult<u64> {
        let min = self.min_seq();
        if min == 0 {
            return Ok(0);
        }

        let mut stale = Vec::new();
        let mut cursor = self.state.cursor()?;
        cursor.seek_for_prev(&encode_seq_key(min - 1))?;
        while let Some(seq) = cursor.key().and_then(decode_seq_key) {
            stale.push(seq);
            cursor.prev()?;
        }
        drop(cursor);

        for chunk in stale.chunks(self.state.config.trim_batch_size.max(1)) {
            let mut batch = WriteBatch::new();
            for &seq in chunk {
                batch.delete(self.state.cf, &encode_seq_key(seq));
            }
            self.state.engine.write(&batch)?;
        }

        let count = stale.len() as u64;
        if count > 0 {
            info!(count, below = min, "cleaned obsolete binlog entries");
        }
        Ok(count)
    }

    /// Rewrites every entry that a newer entry for the same key supersedes
    /// as a `Noop/None` entry with an empty key. Returns the number of
    /// entries rewritten.
    ///
    /// Commits are blocked while this runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan or the rewrite fails.
    pub fn collapse_duplicates(&self) -> CoreResult<u64> {
        let _guard = self.tx_lock.lock();
        let last = self.last_seq();

        let mut newest: HashMap<Vec<u8>, u64> = HashMap::new();
        let mut batch = WriteBatch::new();
        let mut cursor = self.state.cursor()?;
        cursor.seek(&encode_seq_key(self.min_seq()))?;
        while let Some(entry) = self.state.entry_at(&cursor)? {
            if entry.seq() > last {
                break;
            }
            if entry.kind() != Some(BinlogKind::Noop) {
                if let Some(older) = newest.insert(entry.key().to_vec(), entry.seq()) {
                    let noop = LogEntry::new(older, BinlogKind::Noop, BinlogCommand::None, b"");
                    batch.put(self.state.cf, &encode_seq_key(older), noop.as_bytes());
                }
            }
            cursor.next()?;
        }
        drop(cursor);

        let reduced = batch.len() as u64;
        self.state.engine.write(&batch)?;
        info!(reduced, "collapsed duplicate binlog entries");
        Ok(reduced)
    }

    /// Stops the trimmer. Returns false if it did not acknowledge within
    /// `shutdown_timeout` and was detached.
    pub fn shutdown(&self) -> bool {
        match self.trimmer.lock().take() {
            Some(trimmer) => trimmer.shutdown(self.state.config.shutdown_timeout),
            None => true,
        }
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.state.engine
    }

    pub(crate) fn column_family(&self) -> ColumnFamily {
        self.state.cf
    }

    /// Publishes a committed sequence. Called with the transaction lock held.
    pub(crate) fn publish(&self, seq: u64) -> CoreResult<()> {
        let previous = self.state.last_seq.load(Ordering::SeqCst);
        if seq < previous {
            error!(seq, previous, "binlog corrupted: sequence moved backward");
            return Err(CoreError::invariant_violation(format!(
                "committed seq {seq} is below last_seq {previous}"
            )));
        }
        self.state.last_seq.store(seq, Ordering::SeqCst);
        Ok(())
    }
}

impl fmt::Debug for ReplicationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationLog")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for ReplicationLog {
    fn drop(&mut self) {
        if !self.shutdown() {
            warn!("binlog trimmer still running at drop");
        }
    }
}
