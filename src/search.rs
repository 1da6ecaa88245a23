//! `kb search` and `kb recent`.

use anyhow::Result;

use knowledge_harness_core::models::ContentRecord;
use knowledge_harness_core::search::{most_recent, search, SearchCriteria};

use crate::config::Config;
use crate::content_store::ContentStore;
use crate::get::format_ts_iso;

pub async fn run_search(
    config: &Config,
    criteria: &SearchCriteria,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    let store = ContentStore::open(config).await?;
    let results = search(&store, criteria, limit).await;
    store.close().await;

    print_records(&results?, json)
}

pub async fn run_recent(config: &Config, limit: Option<usize>, json: bool) -> Result<()> {
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    let store = ContentStore::open(config).await?;
    let results = most_recent(&store, limit).await;
    store.close().await;

    print_records(&results?, json)
}

fn print_records(records: &[ContentRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in records.iter().enumerate() {
        println!(
            "{}. [{}] {}  {}  {}",
            i + 1,
            r.id,
            r.content_type,
            format_ts_iso(r.timestamp),
            r.url
        );
        if !r.keywords.is_empty() {
            println!("    keywords: {}", r.keywords.join(", "));
        }
        if let Some(summary) = &r.summary {
            println!("    {}", snippet(summary, 160));
        }
    }
    Ok(())
}

/// First `max` characters of `text` on one line.
pub fn snippet(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    }
}
