//! `kb related`.

use anyhow::Result;

use knowledge_harness_core::related::{related, RelatedRequest};

use crate::config::Config;
use crate::content_store::ContentStore;

pub async fn run_related(
    config: &Config,
    id: i64,
    keywords: &[String],
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(config.retrieval.default_limit);
    let mut req = RelatedRequest::new(id, limit).with_overfetch(config.retrieval.related_overfetch);
    if !keywords.is_empty() {
        req = req.with_keywords(keywords);
    }

    let store = ContentStore::open(config).await?;
    let items = related(&store, &req).await;
    store.close().await;
    let items = items?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("No related records.");
        return Ok(());
    }

    for (i, item) in items.iter().enumerate() {
        println!(
            "{}. [{}] {:.3}  {}  {}",
            i + 1,
            item.record.id,
            item.score,
            item.record.content_type,
            item.record.url
        );
        println!("    keywords: {}", item.record.keywords.join(", "));
    }
    Ok(())
}
