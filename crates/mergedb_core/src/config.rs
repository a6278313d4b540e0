//! Database configuration.

use mergedb_codec::HashScheme;
use mergedb_storage::DEFAULT_COMPACT_AFTER_BYTES;
use std::time::Duration;

/// Configuration of the replication log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinlogConfig {
    /// Whether mutations are logged at all.
    pub enabled: bool,

    /// Number of entries the trimmer keeps.
    pub capacity: u64,

    /// Extra entries tolerated past `capacity` before a trim pass runs.
    pub hysteresis: u64,

    /// How often the trimmer wakes up.
    pub trim_interval: Duration,

    /// Deletes per write batch while trimming.
    pub trim_batch_size: usize,

    /// How long shutdown waits for the trimmer before detaching it.
    pub shutdown_timeout: Duration,

    /// Whether opening deletes entries stranded below `min_seq`.
    pub repair_on_open: bool,
}

impl Default for BinlogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 20_000_000,
            hysteresis: 10_000,
            trim_interval: Duration::from_millis(50),
            trim_batch_size: 1000,
            shutdown_timeout: Duration::from_secs(1),
            repair_on_open: false,
        }
    }
}

impl BinlogConfig {
    /// Creates a log configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether mutations are logged.
    #[must_use]
    pub const fn enabled(mut self, value: bool) -> Self {
        self.enabled = value;
        self
    }

    /// Sets the retained entry count.
    #[must_use]
    pub const fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the trim hysteresis.
    #[must_use]
    pub const fn hysteresis(mut self, hysteresis: u64) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    /// Sets the trimmer wake-up interval.
    #[must_use]
    pub const fn trim_interval(mut self, interval: Duration) -> Self {
        self.trim_interval = interval;
        self
    }

    /// Sets the trim sub-batch size.
    #[must_use]
    pub const fn trim_batch_size(mut self, size: usize) -> Self {
        self.trim_batch_size = size;
        self
    }

    /// Sets the bounded wait used on shutdown.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets whether opening repairs stranded entries.
    #[must_use]
    pub const fn repair_on_open(mut self, value: bool) -> Self {
        self.repair_on_open = value;
        self
    }
}

/// Configuration for opening a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Hash layout for a new database. `None` accepts whatever an existing
    /// database persisted and falls back to the generic scheme on creation.
    pub hash_scheme: Option<HashScheme>,

    /// Whether to fsync the journal on every commit.
    pub sync_writes: bool,

    /// Pending merge operands per key before the engine folds them.
    pub max_merge_operands: usize,

    /// Journal growth since the last compaction that makes the next write
    /// compact it. 0 disables automatic compaction.
    pub compact_after_bytes: u64,

    /// Replication log settings.
    pub binlog: BinlogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            hash_scheme: None,
            sync_writes: true,
            max_merge_operands: 64,
            compact_after_bytes: DEFAULT_COMPACT_AFTER_BYTES,
            binlog: BinlogConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Requires a specific hash scheme.
    #[must_use]
    pub const fn hash_scheme(mut self, scheme: HashScheme) -> Self {
        self.hash_scheme = Some(scheme);
        self
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Sets the pending operand limit per key.
    #[must_use]
    pub const fn max_merge_operands(mut self, max: usize) -> Self {
        self.max_merge_operands = max;
        self
    }

    /// Sets the journal growth that triggers automatic compaction.
    #[must_use]
    pub const fn compact_after_bytes(mut self, bytes: u64) -> Self {
        self.compact_after_bytes = bytes;
        self
    }

    /// Sets the replication log configuration.
    #[must_use]
    pub const fn binlog(mut self, binlog: BinlogConfig) -> Self {
        self.binlog = binlog;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert!(config.sync_writes);
        assert_eq!(config.hash_scheme, None);
        assert_eq!(config.compact_after_bytes, 64 * 1024 * 1024);

        let binlog = config.binlog;
        assert!(binlog.enabled);
        assert_eq!(binlog.capacity, 20_000_000);
        assert_eq!(binlog.hysteresis, 10_000);
        assert_eq!(binlog.trim_interval, Duration::from_millis(50));
        assert_eq!(binlog.trim_batch_size, 1000);
        assert_eq!(binlog.shutdown_timeout, Duration::from_secs(1));
        assert!(!binlog.repair_on_open);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .hash_scheme(HashScheme::Packed)
            .sync_writes(false)
            .compact_after_bytes(0)
            .binlog(BinlogConfig::new().capacity(100).hysteresis(5).enabled(false));

        assert!(!config.create_if_missing);
        assert!(!config.sync_writes);
        assert_eq!(config.compact_after_bytes, 0);
        assert_eq!(config.hash_scheme, Some(HashScheme::Packed));
        assert_eq!(config.binlog.capacity, 100);
        assert_eq!(config.binlog.hysteresis, 5);
        assert!(!config.binlog.enabled);
    }
}
