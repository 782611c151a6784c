//! Database statistics and sync overview.
//!
//! Provides a quick summary of what's loaded: record counts per source
//! partition and the latest sync outcome of each. Used by `ruc stats` to
//! give confidence that scheduled runs are landing data.

use anyhow::Result;

use crate::config::Config;
use crate::models::SourceSync;
use crate::store::{RecordStore, SqliteStore};

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;

    let counts = store.count_by_source().await?;
    let syncs = store.list_syncs().await?;
    let total: i64 = counts.iter().map(|(_, n)| n).sum();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("RUC registry: Database Stats");
    println!("=============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Taxpayers:   {}", total);

    if !counts.is_empty() || !syncs.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<10} {:>10} {:>10} {:>8}   {}",
            "SOURCE", "RECORDS", "LAST RUN", "ERRORS", "LAST SYNC"
        );
        println!("  {}", "-".repeat(60));

        for row in merge_rows(&counts, &syncs) {
            let (processed, errors, synced) = match row.sync {
                Some(s) => (
                    s.processed.to_string(),
                    s.errors.to_string(),
                    format_ts_relative(s.synced_at),
                ),
                None => ("-".to_string(), "-".to_string(), "never".to_string()),
            };
            println!(
                "  {:<10} {:>10} {:>10} {:>8}   {}",
                row.source_id, row.records, processed, errors, synced
            );
        }
    }

    println!();
    store.pool().close().await;
    Ok(())
}

struct SourceRow<'a> {
    source_id: String,
    records: i64,
    sync: Option<&'a SourceSync>,
}

/// Union of sources seen in the record table and in the sync ledger.
fn merge_rows<'a>(counts: &[(String, i64)], syncs: &'a [SourceSync]) -> Vec<SourceRow<'a>> {
    let mut ids: Vec<&str> = counts
        .iter()
        .map(|(id, _)| id.as_str())
        .chain(syncs.iter().map(|s| s.source_id.as_str()))
        .collect();
    ids.sort_unstable();
    ids.dedup();

    ids.into_iter()
        .map(|id| SourceRow {
            source_id: id.to_string(),
            records: counts
                .iter()
                .find(|(c, _)| c == id)
                .map(|(_, n)| *n)
                .unwrap_or(0),
            sync: syncs.iter().find(|s| s.source_id == id),
        })
        .collect()
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_merge_rows_unions_sources() {
        let counts = vec![("ruc0".to_string(), 5), ("ruc2".to_string(), 7)];
        let syncs = vec![SourceSync {
            source_id: "ruc1".to_string(),
            archive_url: "u".to_string(),
            archive_sha256: "h".to_string(),
            processed: 0,
            errors: 3,
            synced_at: 0,
        }];
        let rows = merge_rows(&counts, &syncs);
        let ids: Vec<&str> = rows.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids, vec!["ruc0", "ruc1", "ruc2"]);
        assert_eq!(rows[1].records, 0);
        assert_eq!(rows[1].sync.map(|s| s.errors), Some(3));
        assert!(rows[2].sync.is_none());
    }

    #[test]
    fn test_relative_time() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
