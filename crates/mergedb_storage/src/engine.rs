//! The ordered key-value engine.

use crate::batch::{BatchOp, ColumnFamily, WriteBatch};
use crate::cursor::Cursor;
use crate::device::LogDevice;
use crate::error::{StorageError, StorageResult};
use crate::file::FileDevice;
use crate::journal::{Journal, JournalHeader};
use crate::memory::MemoryDevice;
use crate::merge::MergeOperator;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the family every engine has at index 0.
pub const DEFAULT_COLUMN_FAMILY: &str = "default";

/// Operations per snapshot batch written by [`Engine::compact`].
const SNAPSHOT_BATCH_OPS: usize = 4096;

/// Default journal growth that triggers an automatic compaction.
pub const DEFAULT_COMPACT_AFTER_BYTES: u64 = 64 * 1024 * 1024;

type Table = BTreeMap<Vec<u8>, Slot>;

/// Options for opening an [`Engine`].
#[derive(Clone)]
pub struct EngineOptions {
    /// Column family names. The first must be [`DEFAULT_COLUMN_FAMILY`].
    pub column_families: Vec<String>,
    /// Operator used to resolve merge operands. Merges are refused without one.
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
    /// Whether every journal append is synced before the write returns.
    pub sync_writes: bool,
    /// Pending operands per key before the engine tries partial merges.
    pub max_merge_operands: usize,
    /// Journal growth since the last compaction after which a write
    /// compacts the journal. 0 disables automatic compaction.
    pub compact_after_bytes: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            column_families: vec![DEFAULT_COLUMN_FAMILY.to_string()],
            merge_operator: None,
            sync_writes: true,
            max_merge_operands: 64,
            compact_after_bytes: DEFAULT_COMPACT_AFTER_BYTES,
        }
    }
}

impl EngineOptions {
    /// Adds a column family after the existing ones.
    #[must_use]
    pub fn with_column_family(mut self, name: impl Into<String>) -> Self {
        self.column_families.push(name.into());
        self
    }

    /// Sets the merge operator.
    #[must_use]
    pub fn with_merge_operator(mut self, operator: Arc<dyn MergeOperator>) -> Self {
        self.merge_operator = Some(operator);
        self
    }

    /// Sets whether journal appends are synced.
    #[must_use]
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Sets the pending operand threshold.
    #[must_use]
    pub fn max_merge_operands(mut self, max: usize) -> Self {
        self.max_merge_operands = max;
        self
    }

    /// Sets the journal growth that triggers automatic compaction.
    #[must_use]
    pub fn compact_after_bytes(mut self, bytes: u64) -> Self {
        self.compact_after_bytes = bytes;
        self
    }

    fn validate(&self) -> StorageResult<()> {
        match self.column_families.first() {
            Some(first) if first == DEFAULT_COLUMN_FAMILY => {}
            _ => {
                return Err(StorageError::invalid_argument(format!(
                    "first column family must be {DEFAULT_COLUMN_FAMILY:?}"
                )))
            }
        }
        if self.column_families.len() > usize::from(u8::MAX) {
            return Err(StorageError::invalid_argument("too many column families"));
        }
        for (i, name) in self.column_families.iter().enumerate() {
            if name.is_empty() || name.len() > usize::from(u8::MAX) {
                return Err(StorageError::invalid_argument(format!(
                    "invalid column family name {name:?}"
                )));
            }
            if self.column_families[..i].contains(name) {
                return Err(StorageError::invalid_argument(format!(
                    "duplicate column family {name:?}"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("column_families", &self.column_families)
            .field(
                "merge_operator",
                &self.merge_operator.as_ref().map(|op| op.name().to_string()),
            )
            .field("sync_writes", &self.sync_writes)
            .field("max_merge_operands", &self.max_merge_operands)
            .field("compact_after_bytes", &self.compact_after_bytes)
            .finish()
    }
}

/// Per-key state. A delete removes the key outright.
#[derive(Debug, Clone)]
enum Slot {
    Value(Vec<u8>),
    Pending {
        base: Option<Vec<u8>>,
        operands: Vec<Vec<u8>>,
    },
}

/// Counters for one column family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyStats {
    /// Family name.
    pub name: String,
    /// Live keys, resolved or not.
    pub keys: usize,
    /// Keys holding unresolved merge operands.
    pub pending_keys: usize,
    /// Unresolved operands across all keys.
    pub pending_operands: usize,
}

/// Engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// One entry per column family, in index order.
    pub families: Vec<FamilyStats>,
    /// Current journal size in bytes.
    pub journal_bytes: u64,
}

/// Outcome of [`Engine::compact`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Keys whose pending operands were folded into a value.
    pub resolved_keys: usize,
    /// Operands consumed.
    pub operands_folded: usize,
    /// Live keys written to the snapshot.
    pub live_keys: usize,
    /// Journal size before the rewrite.
    pub bytes_before: u64,
    /// Journal size after the rewrite.
    pub bytes_after: u64,
}

pub(crate) enum Direction {
    Forward,
    Backward,
}

/// An ordered key-value engine with column families and merge operands.
///
/// Writes go through [`WriteBatch`]es: a batch is appended to the journal
/// first and applied to memory only after the append succeeded, so a batch
/// is either fully visible or not visible at all.
///
/// Merge operands are stored as-is and resolved on read, during
/// [`Engine::compact`], or when a key collects more than
/// `max_merge_operands` operands.
///
/// Deletes only append to the journal. Once it has grown by
/// `compact_after_bytes` since the last compaction, the next write compacts
/// it, so the file stays proportional to the live data.
///
/// # Thread Safety
///
/// The engine is `Send + Sync`. Writers are serialized on the journal;
/// readers run concurrently with each other.
///
/// # Example
///
/// ```rust
/// use mergedb_storage::{ColumnFamily, Engine, EngineOptions, WriteBatch};
///
/// let engine = Engine::open_in_memory(EngineOptions::default()).unwrap();
/// let mut batch = WriteBatch::new();
/// batch.put(ColumnFamily::DEFAULT, b"key", b"value");
/// engine.write(&batch).unwrap();
/// assert_eq!(engine.get(ColumnFamily::DEFAULT, b"key").unwrap(), Some(b"value".to_vec()));
/// ```
pub struct Engine {
    families: Vec<String>,
    operator: Option<Arc<dyn MergeOperator>>,
    max_merge_operands: usize,
    compact_after_bytes: u64,
    /// Journal size right after the last compaction, or at open.
    compacted_bytes: AtomicU64,
    tables: RwLock<Vec<Table>>,
    journal: Mutex<Journal>,
    closed: AtomicBool,
}

impl Engine {
    /// Opens an engine over a journal device, replaying its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - The journal is corrupted
    /// - The journal records other column families or another merge operator
    pub fn open(device: Box<dyn LogDevice>, options: EngineOptions) -> StorageResult<Self> {
        options.validate()?;

        let mut journal = Journal::new(device, options.sync_writes);
        let replay = journal.replay()?;
        let supplied_operator = options.merge_operator.as_ref().map(|op| op.name().to_string());

        match &replay.header {
            Some(header) => {
                if header.families != options.column_families {
                    return Err(StorageError::invalid_argument(format!(
                        "column families {:?} do not match journal {:?}",
                        options.column_families, header.families
                    )));
                }
                if header.merge_operator != supplied_operator {
                    return Err(StorageError::OperatorMismatch {
                        persisted: header.merge_operator.clone(),
                        supplied: supplied_operator,
                    });
                }
            }
            None => {
                journal.append_header(&JournalHeader {
                    families: options.column_families.clone(),
                    merge_operator: supplied_operator,
                })?;
            }
        }

        let engine = Self {
            tables: RwLock::new(vec![BTreeMap::new(); options.column_families.len()]),
            families: options.column_families,
            operator: options.merge_operator,
            max_merge_operands: options.max_merge_operands,
            compact_after_bytes: options.compact_after_bytes,
            compacted_bytes: AtomicU64::new(journal.size()?),
            journal: Mutex::new(journal),
            closed: AtomicBool::new(false),
        };

        {
            let mut tables = engine.tables.write();
            for batch in &replay.batches {
                engine.check_batch(batch)?;
                engine.apply(&mut tables, batch);
            }
        }

        info!(
            batches = replay.batches.len(),
            truncated = replay.truncated_bytes,
            families = engine.families.len(),
            "engine opened"
        );
        Ok(engine)
    }

    /// Opens an engine whose journal lives in a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or replayed.
    pub fn open_path(path: &Path, options: EngineOptions) -> StorageResult<Self> {
        Self::open(Box::new(FileDevice::open(path)?), options)
    }

    /// Opens a fresh engine that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn open_in_memory(options: EngineOptions) -> StorageResult<Self> {
        Self::open(Box::new(MemoryDevice::new()), options)
    }

    /// Looks up a column family by name.
    #[must_use]
    pub fn column_family(&self, name: &str) -> Option<ColumnFamily> {
        self.families
            .iter()
            .position(|n| n == name)
            .map(|i| ColumnFamily::new(i as u8))
    }

    /// Returns the column family names in index order.
    #[must_use]
    pub fn column_family_names(&self) -> &[String] {
        &self.families
    }

    /// Returns the name of the configured merge operator.
    #[must_use]
    pub fn merge_operator_name(&self) -> Option<&str> {
        self.operator.as_deref().map(|op| op.name())
    }

    /// Applies a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed, the batch names an unknown
    /// family or contains merges without an operator, or the journal append
    /// fails. On error nothing from the batch is visible.
    pub fn write(&self, batch: &WriteBatch) -> StorageResult<()> {
        self.ensure_open()?;
        self.check_batch(batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut journal = self.journal.lock();
        journal.append_batch(batch)?;

        let mut tables = self.tables.write();
        self.apply(&mut tables, batch);
        self.maybe_compact(&mut journal, &mut tables);
        Ok(())
    }

    /// Writes a single value.
    ///
    /// # Errors
    ///
    /// See [`Engine::write`].
    pub fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(cf, key, value);
        self.write(&batch)
    }

    /// Records a single merge operand.
    ///
    /// # Errors
    ///
    /// See [`Engine::write`].
    pub fn merge(&self, cf: ColumnFamily, key: &[u8], operand: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.merge(cf, key, operand);
        self.write(&batch)
    }

    /// Deletes a single key.
    ///
    /// # Errors
    ///
    /// See [`Engine::write`].
    pub fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(cf, key);
        self.write(&batch)
    }

    /// Reads the current value of a key, resolving pending merge operands.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed, the family is unknown or
    /// the merge operator rejects the pending operands.
    pub fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.check_family(cf)?;
        let tables = self.tables.read();
        match tables[cf.index()].get(key) {
            Some(slot) => self.resolve(key, slot).map(Some),
            None => Ok(None),
        }
    }

    /// Opens an unpositioned cursor over a column family.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the family is unknown.
    pub fn cursor(&self, cf: ColumnFamily) -> StorageResult<Cursor<'_>> {
        self.ensure_open()?;
        self.check_family(cf)?;
        Ok(Cursor::new(self, cf))
    }

    /// Resolves every pending key and rewrites the journal as a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a merge fails or the journal cannot be replaced.
    /// Reads return the same values whether or not compaction succeeded.
    pub fn compact(&self) -> StorageResult<CompactionStats> {
        self.ensure_open()?;
        let mut journal = self.journal.lock();
        let mut tables = self.tables.write();
        self.compact_locked(&mut journal, &mut tables)
    }

    fn compact_locked(
        &self,
        journal: &mut Journal,
        tables: &mut [Table],
    ) -> StorageResult<CompactionStats> {
        let mut stats = CompactionStats {
            bytes_before: journal.size()?,
            ..CompactionStats::default()
        };

        let mut resolved = Vec::new();
        for (index, table) in tables.iter().enumerate() {
            for (key, slot) in table {
                if let Slot::Pending { base, operands } = slot {
                    let value = self.full_merge(key, base.as_deref(), operands)?;
                    stats.operands_folded += operands.len();
                    resolved.push((index, key.clone(), value));
                }
            }
        }
        stats.resolved_keys = resolved.len();
        for (index, key, value) in resolved {
            tables[index].insert(key, Slot::Value(value));
        }

        let mut snapshot = Vec::new();
        let mut batch = WriteBatch::new();
        for (index, table) in tables.iter().enumerate() {
            let cf = ColumnFamily::new(index as u8);
            for (key, slot) in table {
                if let Slot::Value(value) = slot {
                    batch.put(cf, key, value);
                    stats.live_keys += 1;
                    if batch.len() == SNAPSHOT_BATCH_OPS {
                        snapshot.push(std::mem::take(&mut batch));
                    }
                }
            }
        }
        if !batch.is_empty() {
            snapshot.push(batch);
        }

        let header = JournalHeader {
            families: self.families.clone(),
            merge_operator: self.merge_operator_name().map(str::to_string),
        };
        journal.rewrite(&header, &snapshot)?;
        stats.bytes_after = journal.size()?;
        self.compacted_bytes.store(stats.bytes_after, Ordering::SeqCst);

        info!(
            resolved = stats.resolved_keys,
            live = stats.live_keys,
            before = stats.bytes_before,
            after = stats.bytes_after,
            "engine compacted"
        );
        Ok(stats)
    }

    /// Returns per-family counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal size cannot be read.
    pub fn stats(&self) -> StorageResult<EngineStats> {
        let journal_bytes = self.journal.lock().size()?;
        let tables = self.tables.read();
        let families = tables
            .iter()
            .zip(&self.families)
            .map(|(table, name)| {
                let mut stats = FamilyStats {
                    name: name.clone(),
                    keys: table.len(),
                    ..FamilyStats::default()
                };
                for slot in table.values() {
                    if let Slot::Pending { operands, .. } = slot {
                        stats.pending_keys += 1;
                        stats.pending_operands += operands.len();
                    }
                }
                stats
            })
            .collect();
        Ok(EngineStats {
            families,
            journal_bytes,
        })
    }

    /// Syncs the journal to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.journal.lock().sync()
    }

    /// Syncs and closes the engine. Later calls return `StorageError::Closed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.journal.lock().sync()
    }

    /// Returns true until [`Engine::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn entry_from(
        &self,
        cf: ColumnFamily,
        bound: Bound<&[u8]>,
        direction: Direction,
    ) -> StorageResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.ensure_open()?;
        let tables = self.tables.read();
        let table = &tables[cf.index()];
        let found = match direction {
            Direction::Forward => table.range::<[u8], _>((bound, Bound::Unbounded)).next(),
            Direction::Backward => table.range::<[u8], _>((Bound::Unbounded, bound)).next_back(),
        };
        match found {
            Some((key, slot)) => Ok(Some((key.clone(), self.resolve(key, slot)?))),
            None => Ok(None),
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn check_family(&self, cf: ColumnFamily) -> StorageResult<()> {
        if cf.index() >= self.families.len() {
            return Err(StorageError::invalid_argument(format!(
                "unknown column family index {}",
                cf.index()
            )));
        }
        Ok(())
    }

    fn check_batch(&self, batch: &WriteBatch) -> StorageResult<()> {
        for op in batch.ops() {
            self.check_family(op.cf())?;
        }
        if self.operator.is_none() && batch.has_merges() {
            return Err(StorageError::invalid_argument(
                "merge requires a merge operator",
            ));
        }
        Ok(())
    }

    /// Compacts once the journal has outgrown the last snapshot by
    /// `compact_after_bytes`. The write that got here already succeeded, so
    /// a failure is only logged and retried after another threshold.
    fn maybe_compact(&self, journal: &mut Journal, tables: &mut [Table]) {
        if self.compact_after_bytes == 0 {
            return;
        }
        let Ok(size) = journal.size() else {
            return;
        };
        let baseline = self.compacted_bytes.load(Ordering::SeqCst);
        if size.saturating_sub(baseline) < self.compact_after_bytes {
            return;
        }
        if let Err(err) = self.compact_locked(journal, tables) {
            warn!(error = %err, size, "automatic compaction failed");
            self.compacted_bytes.store(size, Ordering::SeqCst);
        }
    }

    fn apply(&self, tables: &mut [Table], batch: &WriteBatch) {
        for op in batch.ops() {
            let table = &mut tables[op.cf().index()];
            match op {
                BatchOp::Put { key, value, .. } => {
                    table.insert(key.clone(), Slot::Value(value.clone()));
                }
                BatchOp::Delete { key, .. } => {
                    table.remove(key);
                }
                BatchOp::Merge { key, operand, .. } => {
                    let slot = match table.remove(key) {
                        None => Slot::Pending {
                            base: None,
                            operands: vec![operand.clone()],
                        },
                        Some(Slot::Value(value)) => Slot::Pending {
                            base: Some(value),
                            operands: vec![operand.clone()],
                        },
                        Some(Slot::Pending { base, mut operands }) => {
                            operands.push(operand.clone());
                            if self.max_merge_operands > 0 && operands.len() > self.max_merge_operands
                            {
                                operands = self.fold_operands(key, operands);
                            }
                            Slot::Pending { base, operands }
                        }
                    };
                    table.insert(key.clone(), slot);
                }
            }
        }
    }

    /// Combines adjacent operands wherever the operator accepts.
    fn fold_operands(&self, key: &[u8], operands: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let Some(operator) = self.operator.as_deref() else {
            return operands;
        };
        let before = operands.len();
        let mut folded: Vec<Vec<u8>> = Vec::with_capacity(before);
        for operand in operands {
            let combined = folded
                .last()
                .and_then(|left| operator.partial_merge(key, left, &operand));
            match combined {
                Some(value) => {
                    if let Some(last) = folded.last_mut() {
                        *last = value;
                    }
                }
                None => folded.push(operand),
            }
        }
        debug!(before, after = folded.len(), "folded merge operands");
        folded
    }

    fn resolve(&self, key: &[u8], slot: &Slot) -> StorageResult<Vec<u8>> {
        match slot {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Pending { base, operands } => self.full_merge(key, base.as_deref(), operands),
        }
    }

    fn full_merge(
        &self,
        key: &[u8],
        base: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> StorageResult<Vec<u8>> {
        let operator = self
            .operator
            .as_deref()
            .ok_or_else(|| StorageError::invalid_argument("merge requires a merge operator"))?;
        operator
            .full_merge(key, base, operands)
            .map_err(|err| StorageError::MergeFailed {
                key: hex(key),
                message: err.message().to_string(),
            })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.journal.lock().sync();
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("families", &self.families)
            .field("merge_operator", &self.merge_operator_name())
            .field("open", &self.is_open())
            .finish()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
