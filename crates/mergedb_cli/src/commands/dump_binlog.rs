//! Dump binlog command implementation.

use super::open_existing;
use mergedb_codec::{hexmem, LogEntry};
use mergedb_core::ReplicationLog;
use serde::Serialize;
use std::path::Path;

/// Replication log entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Sequence number.
    pub seq: u64,
    /// Kind name, or the raw byte if unknown.
    pub kind: String,
    /// Command name, or the raw byte if unknown.
    pub command: String,
    /// Escaped storage key.
    pub key: String,
}

impl From<&LogEntry> for EntryInfo {
    fn from(entry: &LogEntry) -> Self {
        Self {
            seq: entry.seq(),
            kind: entry
                .kind()
                .map_or_else(|| format!("unknown({})", entry.kind_byte()), |k| k.name().to_string()),
            command: entry.command().map_or_else(
                || format!("unknown({})", entry.command_byte()),
                |c| c.name().to_string(),
            ),
            key: hexmem(entry.key()),
        }
    }
}

/// Runs the dump-binlog command.
pub fn run(
    path: &Path,
    start: u64,
    limit: Option<usize>,
    capacity: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path, capacity)?;
    let entries = read_entries(db.binlog(), start, limit)?;
    let (min_seq, last_seq) = (db.binlog().min_seq(), db.binlog().last_seq());
    db.close()?;

    match format {
        "json" => {
            let infos: Vec<EntryInfo> = entries.iter().map(EntryInfo::from).collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        _ => {
            println!(
                "Binlog entries ({} shown, window {}..={})",
                entries.len(),
                min_seq,
                last_seq
            );
            println!("================");
            println!();
            for entry in &entries {
                println!("{}", entry.to_display_string());
            }
        }
    }

    Ok(())
}

/// Collects up to `limit` entries with sequence at least `start`.
fn read_entries(
    log: &ReplicationLog,
    start: u64,
    limit: Option<usize>,
) -> Result<Vec<LogEntry>, Box<dyn std::error::Error>> {
    let max_entries = limit.unwrap_or(usize::MAX);
    let mut entries = Vec::new();
    let mut next = start;

    while entries.len() < max_entries {
        let Some(entry) = log.find_next(next)? else {
            break;
        };
        let seq = entry.seq();
        entries.push(entry);
        match seq.checked_add(1) {
            Some(following) => next = following,
            None => break,
        }
    }

    Ok(entries)
}
