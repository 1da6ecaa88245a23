//! In-memory [`Store`] implementation for tests and embedding callers.
//!
//! Records live in a `BTreeMap` keyed by id behind a `std::sync::RwLock`,
//! so search results come back in id order like the SQLite backend.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ContentRecord, NewRecord, RecordPatch};
use crate::search::SearchCriteria;

use super::{prepare, prepare_patch, Store};

struct Inner {
    next_id: i64,
    records: BTreeMap<i64, ContentRecord>,
}

/// In-memory record store.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                records: BTreeMap::new(),
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.read().map(|g| g.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(&self, record: &NewRecord) -> Result<i64> {
        let record = prepare(record)?;
        let now = chrono::Utc::now().timestamp();
        let mut inner = self.write()?;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.records.insert(
            id,
            ContentRecord {
                id,
                url: record.url,
                content_type: record.content_type,
                timestamp: record.timestamp,
                content: record.content,
                summary: record.summary,
                keywords: record.keywords,
                embedding: record.embedding,
                markdown: record.markdown,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<ContentRecord>> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    async fn update(&self, id: i64, patch: &RecordPatch) -> Result<bool> {
        let patch = prepare_patch(patch)?;
        if patch.is_empty() {
            return Ok(false);
        }
        let mut inner = self.write()?;
        match inner.records.get_mut(&id) {
            Some(record) => {
                patch.apply_to(record);
                record.updated_at = chrono::Utc::now().timestamp();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.write()?.records.remove(&id).is_some())
    }

    async fn search(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<ContentRecord>> {
        if criteria.matches_nothing() {
            return Ok(Vec::new());
        }
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| criteria.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    fn record(url: &str, keywords: &[&str]) -> NewRecord {
        let mut r = NewRecord::new(url, ContentType::General, 1_640_995_200, "body text");
        r.keywords = keywords.iter().map(|k| k.to_string()).collect();
        r
    }

    #[tokio::test]
    async fn test_insert_get_round_trip() {
        let store = InMemoryStore::new();
        let id = store
            .insert(&record("example.com/a?utm_source=x", &["rust", " db "]))
            .await
            .unwrap();

        let got = store.get(id).await.unwrap().unwrap();
        assert_eq!(got.url, "https://example.com/a");
        assert_eq!(got.keywords, vec!["rust", "db"]);
        assert_eq!(got.timestamp, 1_640_995_200);
        assert!(store.get(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_keywords() {
        let store = InMemoryStore::new();
        let id = store.insert(&record("https://a.io", &["old"])).await.unwrap();

        let patch = RecordPatch {
            keywords: Some(vec!["new".into(), "set".into()]),
            ..Default::default()
        };
        assert!(store.update(id, &patch).await.unwrap());
        assert_eq!(store.get(id).await.unwrap().unwrap().keywords, vec!["new", "set"]);

        assert!(!store.update(id, &RecordPatch::default()).await.unwrap());
        assert!(!store.update(999, &patch).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        let id = store.insert(&record("https://a.io", &[])).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid() {
        let store = InMemoryStore::new();
        let mut bad = record("https://a.io", &[]);
        bad.timestamp = -5;
        assert!(store.insert(&bad).await.is_err());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_search_limit() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .insert(&record(&format!("https://a.io/{}", i), &["k"]))
                .await
                .unwrap();
        }
        let all = store.search(&SearchCriteria::new(), 3).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, 1);
    }
}
