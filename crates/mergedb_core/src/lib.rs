//! # MergeDB Core
//!
//! Hash storage with a replication log, on top of `mergedb_storage`.
//!
//! This crate provides:
//! - [`HashMergeOperator`]: conflict-free field-level merges for hash values
//! - [`ReplicationLog`]: bounded, sequence-numbered log of committed mutations
//! - [`Transaction`]: data writes and log entries applied in one atomic batch
//! - [`HashStore`]: `hset`/`hget`/`hdel`/... over merge operands
//! - [`Database`]: directory lock, manifest and configuration
//!
//! ## Example
//!
//! ```rust
//! use mergedb_codec::{BinlogCommand, BinlogKind, HashScheme};
//! use mergedb_core::{Config, Database};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config::default().hash_scheme(HashScheme::Packed);
//! let db = Database::open_with_config(dir.path(), config).unwrap();
//!
//! db.hashes().hset(b"game", b"a0b1", b"12", BinlogKind::Sync).unwrap();
//! db.hashes().hdel(b"game", b"a0b1", BinlogKind::Sync).unwrap();
//!
//! let entry = db.binlog().find_last().unwrap().unwrap();
//! assert_eq!(entry.seq(), 2);
//! assert_eq!(entry.command(), Some(BinlogCommand::HDel));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binlog;
mod config;
mod database;
mod dir;
mod error;
mod hash;
mod manifest;
mod merge;
mod transaction;

pub use binlog::{BinlogStats, ReplicationLog, BINLOG_COLUMN_FAMILY};
pub use config::{BinlogConfig, Config};
pub use database::{Database, DatabaseStats};
pub use dir::DatabaseDir;
pub use error::{CoreError, CoreResult};
pub use hash::{HashScan, HashStore};
pub use manifest::{Manifest, FORMAT_VERSION, MANIFEST_MAGIC, MANIFEST_VERSION};
pub use merge::HashMergeOperator;
pub use transaction::Transaction;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
