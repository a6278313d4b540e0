//! Database facade.

use crate::binlog::{BinlogStats, ReplicationLog, BINLOG_COLUMN_FAMILY};
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::hash::HashStore;
use crate::manifest::Manifest;
use crate::merge::HashMergeOperator;
use mergedb_codec::{HashEncoder, HashScheme};
use mergedb_storage::{
    CompactionStats, Engine, EngineOptions, EngineStats, FileDevice, LogDevice, MemoryDevice,
    MergeOperator,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Counters reported by [`Database::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Hash layout of the database.
    pub hash_scheme: HashScheme,
    /// Engine counters.
    pub engine: EngineStats,
    /// Replication log counters.
    pub binlog: BinlogStats,
}

/// An open MergeDB database.
///
/// Owns the directory lock, the engine, the replication log with its
/// trimmer, and the hash handler built for the persisted scheme.
///
/// # Example
///
/// ```rust
/// use mergedb_codec::BinlogKind;
/// use mergedb_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
/// db.hashes().hset(b"user:1", b"name", b"ann", BinlogKind::Sync).unwrap();
///
/// assert_eq!(db.hashes().hget(b"user:1", b"name").unwrap(), Some(b"ann".to_vec()));
/// assert_eq!(db.binlog().last_seq(), 1);
/// ```
#[derive(Debug)]
pub struct Database {
    dir: Option<DatabaseDir>,
    config: Config,
    manifest: Manifest,
    engine: Arc<Engine>,
    binlog: Arc<ReplicationLog>,
    hashes: HashStore,
}

impl Database {
    /// Opens a database directory with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`Database::open_with_config`].
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database directory.
    ///
    /// A new database records the configured hash scheme (generic when none
    /// is set) in its manifest. An existing database keeps its scheme; asking
    /// for a different one is an error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::DatabaseLocked` if another process holds the
    /// directory, `CoreError::InvalidFormat` for a missing or mismatched
    /// manifest, and `CoreError::StartupFailed` if the log cannot start.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let is_new = dir.is_new_database();

        if !config.create_if_missing && is_new {
            return Err(CoreError::invalid_format(
                "database does not exist and create_if_missing is false",
            ));
        }
        if config.error_if_exists && !is_new {
            return Err(CoreError::invalid_format(
                "database already exists and error_if_exists is true",
            ));
        }

        let manifest = match dir.load_manifest()? {
            Some(manifest) => {
                match config.hash_scheme {
                    Some(scheme) if scheme != manifest.hash_scheme => {
                        return Err(CoreError::invalid_format(format!(
                            "database uses the {} hash scheme, {scheme} requested",
                            manifest.hash_scheme
                        )));
                    }
                    _ => {}
                }
                manifest
            }
            None if is_new => {
                let manifest = new_manifest(&config);
                dir.save_manifest(&manifest)?;
                manifest
            }
            None => {
                return Err(CoreError::invalid_format(
                    "journal present but MANIFEST is missing",
                ));
            }
        };

        let device = FileDevice::open(&dir.journal_path())?;
        Self::assemble(Some(dir), config, manifest, Box::new(device))
    }

    /// Opens a database that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot start.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_device(Config::default(), Box::new(MemoryDevice::new()))
    }

    /// Opens a database over an arbitrary journal device, without a
    /// directory or manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be replayed or the log cannot
    /// start.
    pub fn open_with_device(config: Config, device: Box<dyn LogDevice>) -> CoreResult<Self> {
        let manifest = new_manifest(&config);
        Self::assemble(None, config, manifest, device)
    }

    fn assemble(
        dir: Option<DatabaseDir>,
        config: Config,
        manifest: Manifest,
        device: Box<dyn LogDevice>,
    ) -> CoreResult<Self> {
        let encoder = HashEncoder::new(manifest.hash_scheme);
        let operator = HashMergeOperator::new(encoder);
        if operator.name() != manifest.merge_operator {
            return Err(CoreError::invalid_format(format!(
                "manifest names merge operator {:?}, this build provides {:?}",
                manifest.merge_operator,
                operator.name()
            )));
        }

        let options = EngineOptions::default()
            .with_column_family(BINLOG_COLUMN_FAMILY)
            .with_merge_operator(Arc::new(operator))
            .sync_writes(config.sync_writes)
            .max_merge_operands(config.max_merge_operands)
            .compact_after_bytes(config.compact_after_bytes);
        let engine = Arc::new(Engine::open(device, options)?);

        let binlog = Arc::new(ReplicationLog::open(Arc::clone(&engine), config.binlog)?);
        if config.binlog.repair_on_open {
            binlog.clean_obsolete()?;
        }

        let hashes = HashStore::new(Arc::clone(&engine), Arc::clone(&binlog), encoder);
        info!(
            path = ?dir.as_ref().map(DatabaseDir::path),
            scheme = %manifest.hash_scheme,
            last_seq = binlog.last_seq(),
            "database opened"
        );

        Ok(Self {
            dir,
            config,
            manifest,
            engine,
            binlog,
            hashes,
        })
    }

    /// Returns the hash handler.
    #[must_use]
    pub fn hashes(&self) -> &HashStore {
        &self.hashes
    }

    /// Returns the replication log.
    #[must_use]
    pub fn binlog(&self) -> &ReplicationLog {
        &self.binlog
    }

    /// Returns the underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns the manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the directory, or `None` for a database without one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Resolves every pending merge and rewrites the journal.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MergeCorruption` if a hash cannot be resolved;
    /// nothing is rewritten in that case.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        Ok(self.engine.compact()?)
    }

    /// Returns database counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed.
    pub fn stats(&self) -> CoreResult<DatabaseStats> {
        Ok(DatabaseStats {
            hash_scheme: self.manifest.hash_scheme,
            engine: self.engine.stats()?,
            binlog: self.binlog.stats(),
        })
    }

    /// Stops the trimmer and closes the engine. Later operations fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the final journal sync fails.
    pub fn close(&self) -> CoreResult<()> {
        self.binlog.shutdown();
        self.engine.close()?;
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.engine.is_open()
    }
}

fn new_manifest(config: &Config) -> Manifest {
    let scheme = config.hash_scheme.unwrap_or_default();
    Manifest::new(scheme, HashMergeOperator::name_for(scheme))
}
