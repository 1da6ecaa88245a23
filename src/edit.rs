//! `kb update` and `kb delete`.

use std::path::Path;

use anyhow::{bail, Context, Result};

use knowledge_harness_core::models::RecordPatch;
use knowledge_harness_core::store::Store;

use crate::config::Config;
use crate::content_store::ContentStore;

/// Read a JSON patch file. Unknown fields, including `timestamp`, are
/// rejected.
pub fn read_patch_file(path: &Path) -> Result<RecordPatch> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read patch file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid patch file: {}", path.display()))
}

/// Overlay `overrides` onto `base`; fields set in `overrides` win.
pub fn merge_patch(base: RecordPatch, overrides: RecordPatch) -> RecordPatch {
    RecordPatch {
        url: overrides.url.or(base.url),
        content_type: overrides.content_type.or(base.content_type),
        content: overrides.content.or(base.content),
        summary: overrides.summary.or(base.summary),
        keywords: overrides.keywords.or(base.keywords),
        embedding: overrides.embedding.or(base.embedding),
        markdown: overrides.markdown.or(base.markdown),
    }
}

pub async fn run_update(config: &Config, id: i64, patch: &RecordPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("nothing to update: supply at least one field");
    }

    let store = ContentStore::open(config).await?;
    let updated = store.update(id, patch).await;
    store.close().await;

    if !updated? {
        eprintln!("Error: record not found: {}", id);
        std::process::exit(1);
    }
    println!("updated {}", id);
    Ok(())
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let store = ContentStore::open(config).await?;
    let deleted = store.delete(id).await;
    store.close().await;

    if !deleted? {
        eprintln!("Error: record not found: {}", id);
        std::process::exit(1);
    }
    println!("deleted {}", id);
    Ok(())
}
