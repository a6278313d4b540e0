//! Replication log.
//!
//! This module provides:
//! - `ReplicationLog`: the sequence-numbered log of committed mutations
//! - `BinlogStats`: counters for diagnostics
//! - A background trimmer bounding the log to its capacity

mod queue;
mod trimmer;

pub use queue::{BinlogStats, ReplicationLog, BINLOG_COLUMN_FAMILY};
