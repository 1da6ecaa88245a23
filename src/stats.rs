//! Knowledge base statistics.
//!
//! A quick summary of what's stored: record counts per content type,
//! keyword totals, the most common keywords, and how the flat index
//! compares with the database. A mismatch between index entries and
//! records points at an interrupted store; `kb index rebuild` fixes it.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::content_store::ContentStore;

/// Snapshot of the store's contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub records: i64,
    pub keyword_rows: i64,
    pub distinct_keywords: i64,
    pub by_type: Vec<(String, i64)>,
    pub top_keywords: Vec<(String, i64)>,
    pub newest_capture: Option<i64>,
    pub index_entries: usize,
}

pub async fn collect_stats(store: &ContentStore, top_n: usize) -> Result<Stats> {
    let pool = store.records().pool();

    let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let keyword_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keywords")
        .fetch_one(pool)
        .await?;

    let distinct_keywords: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT keyword_norm) FROM keywords")
            .fetch_one(pool)
            .await?;

    let newest_capture: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM documents")
        .fetch_one(pool)
        .await?;

    let by_type: Vec<(String, i64)> = sqlx::query(
        "SELECT type, COUNT(*) AS n FROM documents GROUP BY type ORDER BY n DESC, type ASC",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| (row.get::<String, _>("type"), row.get::<i64, _>("n")))
    .collect();

    let top_keywords: Vec<(String, i64)> = sqlx::query(
        r#"
        SELECT keyword_norm AS keyword, COUNT(DISTINCT document_id) AS n
        FROM keywords
        GROUP BY keyword_norm
        ORDER BY n DESC, keyword ASC
        LIMIT ?
        "#,
    )
    .bind(i64::try_from(top_n).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| (row.get::<String, _>("keyword"), row.get::<i64, _>("n")))
    .collect();

    let index_entries = store.index().entries()?.len();

    Ok(Stats {
        records,
        keyword_rows,
        distinct_keywords,
        by_type,
        top_keywords,
        newest_capture,
        index_entries,
    })
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = ContentStore::open(config).await?;
    let stats = collect_stats(&store, 10).await;
    store.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Knowledge Harness Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Storage:     {}", config.storage.root.display());
    println!();
    println!("  Records:     {}", stats.records);
    println!(
        "  Keywords:    {} ({} distinct)",
        stats.keyword_rows, stats.distinct_keywords
    );
    println!(
        "  Index:       {} entries{}",
        stats.index_entries,
        if stats.index_entries as i64 != stats.records {
            "  (differs from records; run `kb index rebuild`)"
        } else {
            ""
        }
    );
    if let Some(ts) = stats.newest_capture {
        println!("  Latest:      {}", format_ts_relative(ts));
    }

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<16} {:>8}", "TYPE", "RECORDS");
        println!("  {}", "-".repeat(25));
        for (kind, n) in &stats.by_type {
            println!("  {:<16} {:>8}", kind, n);
        }
    }

    if !stats.top_keywords.is_empty() {
        println!();
        println!("  Top keywords:");
        for (keyword, n) in &stats.top_keywords {
            println!("  {:<32} {:>6}", keyword, n);
        }
    }

    println!();
    Ok(())
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
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return crate::get::format_ts_iso(ts);
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
        crate::get::format_ts_iso(ts)
    }
}
