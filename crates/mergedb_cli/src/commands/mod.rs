//! CLI command implementations.

pub mod compact;
pub mod dump_binlog;
pub mod inspect;
pub mod repair_binlog;

use mergedb_core::{BinlogConfig, Config, Database};
use std::path::Path;

/// Opens an existing database; commands never create one.
///
/// The binlog capacity is not persisted, so commands that depend on the
/// retained window take the application's capacity as an argument.
pub fn open_existing(
    path: &Path,
    capacity: Option<u64>,
) -> Result<Database, Box<dyn std::error::Error>> {
    if !path.join("MANIFEST").exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    let mut binlog = BinlogConfig::default();
    if let Some(capacity) = capacity {
        binlog = binlog.capacity(capacity);
    }
    let config = Config::default().create_if_missing(false).binlog(binlog);
    Ok(Database::open_with_config(path, config)?)
}

/// Formats a byte count for text output.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
