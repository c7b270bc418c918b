//! Index statistics and health overview.
//!
//! Provides a quick summary of what's indexed: entry counts per source
//! partition, when each partition was last written, and how far the live
//! ingester has read into the interaction log. Used by `brain stats`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::cursor::{CursorStore, FileCursorStore};
use crate::db;

struct SourceStats {
    source: String,
    entries: i64,
    last_write_ts: Option<i64>,
}

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let collection = &config.index.collection;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
        .bind(collection)
        .fetch_one(&pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT source, COUNT(*) AS entries, MAX(created_at) AS last_write
        FROM entries
        WHERE collection = ?
        GROUP BY source
        ORDER BY entries DESC
        "#,
    )
    .bind(collection)
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            entries: row.get("entries"),
            last_write_ts: row.get("last_write"),
        })
        .collect();

    let db_path = config.paths.index_db();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let cursor = FileCursorStore::new(&config.paths.cursor).load()?;
    let log_lines = count_lines(&config.paths.live_log);

    println!("Local Brain index stats");
    println!("=======================");
    println!();
    println!("  Index:       {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", collection);
    println!("  Entries:     {}", total);
    println!();
    match log_lines {
        Some(lines) => println!(
            "  Live log:    {} lines, ingested through line {}",
            lines, cursor.last_line
        ),
        None => println!("  Live log:    (none yet)"),
    }

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<16} {:>10}   {}", "SOURCE", "ENTRIES", "LAST WRITE");
        println!("  {}", "-".repeat(48));

        for s in &source_stats {
            let written = match s.last_write_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!("  {:<16} {:>10}   {}", s.source, s.entries, written);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn count_lines(path: &std::path::Path) -> Option<usize> {
    std::fs::read_to_string(path)
        .ok()
        .map(|content| content.lines().count())
}

/// Human-readable size: `512 B`, `2.0 KB`, `5.0 MB`, `1.25 GB`.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u64); 3] = [("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];

    for (unit, size) in UNITS {
        if bytes >= size {
            let value = bytes as f64 / size as f64;
            return match unit {
                "GB" => format!("{:.2} {}", value, unit),
                _ => format!("{:.1} {}", value, unit),
            };
        }
    }
    format!("{} B", bytes)
}

/// Age of a Unix timestamp ("3 hours ago"); older than a month, or in
/// the future, prints the date instead.
fn format_ts_relative(ts: i64) -> String {
    let Some(written) = chrono::DateTime::from_timestamp(ts, 0) else {
        return ts.to_string();
    };
    let age = chrono::Utc::now().signed_duration_since(written);

    let (count, unit) = if age.num_seconds() < 0 || age.num_days() >= 30 {
        return written.format("%Y-%m-%d %H:%M").to_string();
    } else if age.num_minutes() < 1 {
        return "just now".to_string();
    } else if age.num_hours() < 1 {
        (age.num_minutes(), "min")
    } else if age.num_days() < 1 {
        (age.num_hours(), "hour")
    } else {
        (age.num_days(), "day")
    };

    format!("{} {}{} ago", count, unit, if count == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn recent_timestamp_is_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
