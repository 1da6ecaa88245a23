//! Ingestion: classify a URL, assemble the record, store it.
//!
//! Content, summary, keywords, and embeddings come from upstream
//! extraction and LLM stages (or the operator on the command line); this
//! module only stitches them onto the classification and hands the record
//! to the [`ContentStore`].
//!
//! [`load_dir`] is the recovery path: it walks a directory of record files
//! and inserts any that the database does not have yet.

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use knowledge_harness_core::models::NewRecord;
use knowledge_harness_core::store::prepare;

use crate::classifier::{Classification, Classifier, Route};
use crate::config::Config;
use crate::content_store::ContentStore;
use crate::index::IndexEntry;

/// Everything the upstream stages produced for one URL.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub url: String,
    pub route: Route,
    pub content: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub markdown: Option<String>,
}

impl IngestRequest {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            route: Route::Auto,
            content: content.into(),
            summary: None,
            keywords: Vec::new(),
            embedding: None,
            markdown: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub id: i64,
    pub classification: Classification,
}

pub fn build_record(classification: &Classification, req: &IngestRequest) -> NewRecord {
    NewRecord {
        url: classification.url.clone(),
        content_type: classification.content_type,
        timestamp: classification.timestamp,
        content: req.content.clone(),
        summary: req.summary.clone(),
        keywords: req.keywords.clone(),
        embedding: req.embedding.clone(),
        markdown: req.markdown.clone(),
    }
}

/// Classify, build, and store one record.
pub async fn ingest(
    store: &ContentStore,
    classifier: &Classifier,
    req: &IngestRequest,
) -> Result<Ingested> {
    let classification = classifier.classify_and_path(&req.url, req.route)?;
    let id = store
        .store(&classification.path, &build_record(&classification, req))
        .await?;
    Ok(Ingested { id, classification })
}

pub async fn run_ingest(config: &Config, req: &IngestRequest) -> Result<()> {
    let classifier = Classifier::new(&config.storage.root).with_context(|| {
        format!("Invalid storage root: {}", config.storage.root.display())
    })?;
    let classification = classifier.classify_or_exit(&req.url, req.route)?;

    let store = ContentStore::open(config).await?;
    let id = store
        .store(&classification.path, &build_record(&classification, req))
        .await;
    store.close().await;
    let id = id?;

    println!("ingest {}", classification.url);
    println!("  id: {}", id);
    println!("  type: {}", classification.content_type);
    println!("  timestamp: {}", classification.timestamp_string());
    println!("  path: {}", classification.path.display());
    if classification.fetch_url != classification.url {
        println!("  fetch via: {}", classification.fetch_url);
    }
    println!("ok");
    Ok(())
}

/// Outcome of a directory load.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub scanned: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Insert every record file under `dir` that the database lacks.
///
/// Records are matched on normalized URL plus timestamp, so loading the
/// same directory twice is harmless. Unreadable or invalid files are
/// logged and counted, not fatal.
pub async fn load_dir(store: &ContentStore, dir: &Path) -> Result<LoadStats> {
    let mut stats = LoadStats::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                stats.failed += 1;
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }
        stats.scanned += 1;

        let record = match read_record_file(path) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping invalid record file");
                stats.failed += 1;
                continue;
            }
        };

        if store.records().exists(&record.url, record.timestamp).await? {
            stats.already_present += 1;
            continue;
        }

        let file_path = std::path::absolute(path)?;
        let id = store
            .records()
            .insert_with_path(&record, Some(&file_path))
            .await?;
        store.index().append(&IndexEntry {
            content_type: record.content_type,
            timestamp: record.timestamp,
            path: file_path,
        })?;
        tracing::debug!(id, path = %path.display(), "loaded record");
        stats.inserted += 1;
    }

    Ok(stats)
}

fn read_record_file(path: &Path) -> Result<NewRecord> {
    let raw = std::fs::read_to_string(path)?;
    let record: NewRecord = serde_json::from_str(&raw)?;
    Ok(prepare(&record)?)
}

pub async fn run_load(config: &Config, dir: &Path) -> Result<()> {
    let store = ContentStore::open(config).await?;
    let stats = load_dir(&store, dir).await;
    store.close().await;
    let stats = stats?;

    println!("load {}", dir.display());
    println!("  scanned: {}", stats.scanned);
    println!("  inserted: {}", stats.inserted);
    println!("  already present: {}", stats.already_present);
    println!("  failed: {}", stats.failed);
    println!("ok");
    Ok(())
}
