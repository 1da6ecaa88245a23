//! Storage abstraction for Knowledge Harness.
//!
//! The [`Store`] trait covers the relational half of persistence: records
//! and their keyword lists. The application crate implements it over SQLite
//! and layers the JSON file and flat index writes on top; [`memory`]
//! provides a backend for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ContentRecord, NewRecord, RecordError, RecordPatch};
use crate::normalize::clean_url;
use crate::search::SearchCriteria;

/// Abstract record storage.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](Store::insert) | Insert a record and its keywords atomically |
/// | [`get`](Store::get) | Fetch a record with its keyword list |
/// | [`update`](Store::update) | Replace the fields present in a patch |
/// | [`delete`](Store::delete) | Remove a record and its keywords |
/// | [`search`](Store::search) | Filter records by [`SearchCriteria`] |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a record. Returns the new id.
    async fn insert(&self, record: &NewRecord) -> Result<i64>;

    /// Fetch a record by id. Absent ids are `Ok(None)`.
    async fn get(&self, id: i64) -> Result<Option<ContentRecord>>;

    /// Apply a patch. Returns `true` iff a record was changed.
    ///
    /// When the patch carries keywords, the record's keyword set is
    /// replaced wholesale.
    async fn update(&self, id: i64, patch: &RecordPatch) -> Result<bool>;

    /// Delete a record. Returns `false` when the id does not exist.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Return up to `limit` records matching every supplied criterion.
    ///
    /// No ordering is guaranteed.
    async fn search(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<ContentRecord>>;
}

/// Validate a record and bring it into canonical form for storage:
/// normalized URL, trimmed non-blank keywords.
pub fn prepare(record: &NewRecord) -> Result<NewRecord, RecordError> {
    record.validate()?;
    let mut prepared = record.clone();
    prepared.url = clean_url(&record.url);
    prepared.normalize_keywords();
    Ok(prepared)
}

/// Canonical form of a patch, mirroring [`prepare`].
pub fn prepare_patch(patch: &RecordPatch) -> Result<RecordPatch, RecordError> {
    patch.validate()?;
    let mut prepared = patch.clone();
    if let Some(url) = &patch.url {
        prepared.url = Some(clean_url(url));
    }
    if let Some(keywords) = &patch.keywords {
        prepared.keywords = Some(crate::models::clean_keywords(keywords));
    }
    Ok(prepared)
}
