//! Repair binlog command implementation.

use super::open_existing;
use mergedb_core::ReplicationLog;
use std::path::Path;

/// Repair counters.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Entries deleted below the retained window.
    pub obsolete_removed: u64,
    /// Superseded entries rewritten as no-ops.
    pub collapsed: u64,
}

/// Runs the repair-binlog command.
pub fn run(
    path: &Path,
    capacity: Option<u64>,
    collapse: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path, capacity)?;
    println!("Repairing binlog at {}", path.display());
    println!();

    let stats = repair(db.binlog(), collapse)?;
    db.close()?;

    println!("  Obsolete entries removed: {}", stats.obsolete_removed);
    if collapse {
        println!("  Superseded entries reduced: {}", stats.collapsed);
    }
    println!();
    println!("✓ Repair complete");

    Ok(())
}

fn repair(log: &ReplicationLog, collapse: bool) -> Result<RepairStats, Box<dyn std::error::Error>> {
    let mut stats = RepairStats {
        obsolete_removed: log.clean_obsolete()?,
        ..RepairStats::default()
    };
    if collapse {
        stats.collapsed = log.collapse_duplicates()?;
    }
    Ok(stats)
}
