//! Record retrieval by id.
//!
//! Used by `kb get`; [`print_record`] is shared with the other commands
//! that show a single record.

use anyhow::Result;

use knowledge_harness_core::models::ContentRecord;
use knowledge_harness_core::store::Store;

use crate::config::Config;
use crate::content_store::ContentStore;

/// CLI entry point: fetch a record and print it to stdout.
pub async fn run_get(config: &Config, id: i64, json: bool) -> Result<()> {
    let store = ContentStore::open(config).await?;
    let record = store.get(id).await;
    store.close().await;

    let record = match record? {
        Some(r) => r,
        None => {
            eprintln!("Error: record not found: {}", id);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

pub fn print_record(record: &ContentRecord) {
    println!("--- Record ---");
    println!("id:          {}", record.id);
    println!("type:        {}", record.content_type);
    println!("url:         {}", record.url);
    println!(
        "timestamp:   {} ({})",
        record.timestamp,
        format_ts_iso(record.timestamp)
    );
    println!("keywords:    {}", record.keywords.join(", "));
    println!("created_at:  {}", format_ts_iso(record.created_at));
    println!("updated_at:  {}", format_ts_iso(record.updated_at));
    match &record.embedding {
        Some(v) => println!("embedding:   {} dims", v.len()),
        None => println!("embedding:   none"),
    }
    println!();

    if let Some(summary) = &record.summary {
        println!("--- Summary ---");
        println!("{}", summary);
        println!();
    }

    println!("--- Content ---");
    println!("{}", record.content);
    println!();

    if let Some(md) = &record.markdown {
        println!("--- Markdown ---");
        println!("{}", md);
        println!();
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
