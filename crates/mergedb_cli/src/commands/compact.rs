//! Compact command implementation.

use super::{format_size, open_existing};
use mergedb_storage::CompactionStats;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path, None)?;
    println!("Compacting database at {}", path.display());
    println!();

    let stats = db.compact()?;
    db.close()?;
    print_stats(&stats);

    Ok(())
}

fn print_stats(stats: &CompactionStats) {
    println!("Compaction Results:");
    println!("  Resolved keys:   {}", stats.resolved_keys);
    println!("  Operands folded: {}", stats.operands_folded);
    println!("  Live keys:       {}", stats.live_keys);
    println!();
    println!("  Size before: {}", format_size(stats.bytes_before));
    println!("  Size after:  {}", format_size(stats.bytes_after));
    println!(
        "  Space saved: {} ({:.1}%)",
        format_size(stats.bytes_before.saturating_sub(stats.bytes_after)),
        saved_percent(stats)
    );
    println!();
    println!("✓ Compaction complete");
}

fn saved_percent(stats: &CompactionStats) -> f64 {
    if stats.bytes_before == 0 {
        return 0.0;
    }
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    (saved as f64 / stats.bytes_before as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_percent_handles_growth_and_empty() {
        let mut stats = CompactionStats {
            bytes_before: 200,
            bytes_after: 50,
            ..CompactionStats::default()
        };
        assert!((saved_percent(&stats) - 75.0).abs() < f64::EPSILON);

        stats.bytes_after = 300;
        assert_eq!(saved_percent(&stats), 0.0);

        stats.bytes_before = 0;
        assert_eq!(saved_percent(&stats), 0.0);
    }
}
