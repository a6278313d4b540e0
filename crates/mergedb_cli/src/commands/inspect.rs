//! Inspect command implementation.

use super::{format_size, open_existing};
use mergedb_core::Database;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Format version as `major.minor`.
    pub format_version: String,
    /// Hash scheme name.
    pub hash_scheme: String,
    /// Persisted merge operator name.
    pub merge_operator: String,
    /// Journal size in bytes.
    pub journal_bytes: u64,
    /// Per-family counters.
    pub families: Vec<FamilyInfo>,
    /// Replication log counters.
    pub binlog: BinlogInfo,
}

/// Counters of one column family.
#[derive(Debug, Serialize)]
pub struct FamilyInfo {
    /// Family name.
    pub name: String,
    /// Number of keys.
    pub keys: usize,
    /// Keys with unresolved merge operands.
    pub pending_keys: usize,
    /// Unresolved merge operands across all keys.
    pub pending_operands: usize,
}

/// Replication log counters.
#[derive(Debug, Serialize)]
pub struct BinlogInfo {
    /// Whether mutations are logged.
    pub enabled: bool,
    /// Retained entry count.
    pub capacity: u64,
    /// Oldest retained sequence.
    pub min_seq: u64,
    /// Newest committed sequence.
    pub last_seq: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path, None)?;
    let result = inspect(&db, path)?;
    db.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(db: &Database, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let stats = db.stats()?;
    let manifest = db.manifest();
    let (major, minor) = manifest.format_version;

    Ok(InspectResult {
        path: path.display().to_string(),
        format_version: format!("{major}.{minor}"),
        hash_scheme: stats.hash_scheme.to_string(),
        merge_operator: manifest.merge_operator.clone(),
        journal_bytes: stats.engine.journal_bytes,
        families: stats
            .engine
            .families
            .into_iter()
            .map(|family| FamilyInfo {
                name: family.name,
                keys: family.keys,
                pending_keys: family.pending_keys,
                pending_operands: family.pending_operands,
            })
            .collect(),
        binlog: BinlogInfo {
            enabled: stats.binlog.enabled,
            capacity: stats.binlog.capacity,
            min_seq: stats.binlog.min_seq,
            last_seq: stats.binlog.last_seq,
        },
    })
}

fn print_text_output(result: &InspectResult) {
    println!("MergeDB Database Inspection");
    println!("===========================");
    println!();
    println!("Path:           {}", result.path);
    println!("Format:         {}", result.format_version);
    println!("Hash scheme:    {}", result.hash_scheme);
    println!("Merge operator: {}", result.merge_operator);
    println!("Journal size:   {}", format_size(result.journal_bytes));
    println!();
    println!("Column families:");
    for family in &result.families {
        println!(
            "  {:8} {} keys, {} pending keys, {} pending operands",
            family.name, family.keys, family.pending_keys, family.pending_operands
        );
    }
    println!();
    println!("Binlog:");
    if result.binlog.enabled {
        println!("  capacity : {}", result.binlog.capacity);
        println!("  min_seq  : {}", result.binlog.min_seq);
        println!("  max_seq  : {}", result.binlog.last_seq);
    } else {
        println!("  disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergedb_codec::BinlogKind;

    #[test]
    fn inspect_reports_counters() {
        let db = Database::open_in_memory().unwrap();
        db.hashes().hset(b"k", b"f", b"v", BinlogKind::Sync).unwrap();
        db.hashes().hset(b"k", b"g", b"w", BinlogKind::Sync).unwrap();

        let result = inspect(&db, Path::new("mem")).unwrap();
        assert_eq!(result.hash_scheme, "generic");
        assert_eq!(result.merge_operator, "mergedb.hash.generic.v1");
        assert_eq!(result.binlog.last_seq, 2);
        assert_eq!(result.families.len(), 2);
        assert_eq!(result.families[0].keys, 1);
        assert_eq!(result.families[1].name, "binlog");
        assert_eq!(result.families[1].keys, 2);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["binlog"]["last_seq"], 2);
    }
}
