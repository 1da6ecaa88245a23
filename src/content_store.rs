//! The content store: one place that owns every write.
//!
//! [`ContentStore::store`] performs three writes, in order:
//!
//! 1. the full record as pretty JSON at the classified path;
//! 2. one `type,timestamp,path` line appended to the flat index;
//! 3. the `documents` row and its `keywords` rows, in one transaction.
//!
//! Steps 1 and 2 are not transactional with step 3. A crash in between can
//! leave a JSON file (and index line) with no database row; `kb load`
//! re-imports such files and `kb index rebuild` regenerates the index from
//! the database, which is the source of truth.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use knowledge_harness_core::models::{ContentRecord, NewRecord, RecordPatch};
use knowledge_harness_core::search::SearchCriteria;
use knowledge_harness_core::store::{prepare, Store};

use crate::config::Config;
use crate::db;
use crate::index::{FlatIndex, IndexEntry};
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub struct ContentStore {
    records: SqliteStore,
    index: FlatIndex,
}

impl ContentStore {
    pub fn new(records: SqliteStore, index: FlatIndex) -> Self {
        Self { records, index }
    }

    /// Connect to the configured database, apply the schema, and open the
    /// flat index.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(
            SqliteStore::new(pool),
            FlatIndex::new(config.storage.index_path()),
        ))
    }

    pub fn records(&self) -> &SqliteStore {
        &self.records
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// Persist a record at `path`. Returns the relational id.
    pub async fn store(&self, path: &Path, record: &NewRecord) -> Result<i64> {
        let record = prepare(record)?;

        write_record_file(path, &record)?;

        self.index.append(&IndexEntry {
            content_type: record.content_type,
            timestamp: record.timestamp,
            path: path.to_path_buf(),
        })?;

        let id = self
            .records
            .insert_with_path(&record, Some(path))
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, path = %path.display(), "database insert failed")
            })
            .with_context(|| format!("Failed to store record for {}", record.url))?;

        tracing::info!(id, url = %record.url, path = %path.display(), "stored record");
        Ok(id)
    }

    pub async fn close(&self) {
        self.records.pool().close().await;
    }
}

/// Write a record as pretty-printed JSON, creating parent directories.
pub fn write_record_file(path: &Path, record: &NewRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write record file: {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl Store for ContentStore {
    /// Relational-only insert, for records whose JSON file already exists.
    async fn insert(&self, record: &NewRecord) -> Result<i64> {
        self.records.insert(record).await
    }

    async fn get(&self, id: i64) -> Result<Option<ContentRecord>> {
        self.records.get(id).await
    }

    async fn update(&self, id: i64, patch: &RecordPatch) -> Result<bool> {
        self.records
            .update(id, patch)
            .await
            .inspect_err(|e| tracing::error!(id, error = %e, "update failed"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.records
            .delete(id)
            .await
            .inspect_err(|e| tracing::error!(id, error = %e, "delete failed"))
    }

    async fn search(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<ContentRecord>> {
        self.records.search(criteria, limit).await
    }
}
