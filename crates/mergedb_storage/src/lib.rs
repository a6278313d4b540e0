//! # MergeDB Storage
//!
//! Ordered key-value engine underneath MergeDB.
//!
//! The engine keeps one sorted table per column family and journals every
//! write batch before applying it. Values can be written directly or as
//! merge operands that a [`MergeOperator`] folds together lazily.
//!
//! ## Design Principles
//!
//! - A [`WriteBatch`] is all-or-nothing, across column families
//! - Journal devices are opaque byte stores; the engine owns the framing
//! - Merge operands are never resolved at write time
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Devices
//!
//! - [`MemoryDevice`] - For tests and ephemeral engines
//! - [`FileDevice`] - For persistent storage
//! - [`FaultyDevice`] - Wrapper that fails writes on demand
//!
//! ## Example
//!
//! ```rust
//! use mergedb_storage::{ColumnFamily, Engine, EngineOptions, WriteBatch};
//!
//! let engine = Engine::open_in_memory(
//!     EngineOptions::default().with_column_family("binlog"),
//! ).unwrap();
//! let binlog = engine.column_family("binlog").unwrap();
//!
//! let mut batch = WriteBatch::new();
//! batch.put(ColumnFamily::DEFAULT, b"user", b"alice");
//! batch.put(binlog, b"\x01seq", b"set user");
//! engine.write(&batch).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod cursor;
mod device;
mod engine;
mod error;
mod faulty;
mod file;
mod journal;
mod memory;
mod merge;

pub use batch::{BatchOp, ColumnFamily, WriteBatch};
pub use cursor::Cursor;
pub use device::LogDevice;
pub use engine::{
    CompactionStats, Engine, EngineOptions, EngineStats, FamilyStats, DEFAULT_COLUMN_FAMILY,
    DEFAULT_COMPACT_AFTER_BYTES,
};
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultSwitch, FaultyDevice};
pub use file::FileDevice;
pub use journal::JOURNAL_MAGIC;
pub use memory::MemoryDevice;
pub use merge::{MergeError, MergeOperator};
