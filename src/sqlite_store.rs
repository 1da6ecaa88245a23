//! SQLite-backed [`Store`] implementation.
//!
//! Records live in `documents`; their keywords in `keywords`, one row per
//! keyword in insertion order. Every mutation runs in a single transaction,
//! so a failure part-way through (for example while inserting keywords)
//! leaves no trace.
//!
//! SQLite's `lower()` folds ASCII only, so case-insensitive matching runs
//! against columns folded in Rust on write: `documents.search_text` and
//! `keywords.keyword_norm`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};

use knowledge_harness_core::models::{
    parse_embedding, ContentRecord, ContentType, NewRecord, RecordPatch,
};
use knowledge_harness_core::search::{keyword_key, search_text, SearchCriteria};
use knowledge_harness_core::store::{prepare, prepare_patch, Store};

/// Record columns plus the keyword list aggregated as a JSON array.
const SELECT_RECORD: &str = r#"
    SELECT d.id, d.url, d.type, d.timestamp, d.content, d.summary, d.embeddings,
           d.obsidian_markdown, d.created_at, d.updated_at,
           (SELECT json_group_array(k.keyword)
              FROM (SELECT keyword FROM keywords WHERE document_id = d.id ORDER BY id) AS k
           ) AS keywords
    FROM documents d
"#;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// True if a record with this (normalized) URL and capture time exists.
    pub async fn exists(&self, url: &str, timestamp: i64) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE url = ? AND timestamp = ?)",
        )
        .bind(url)
        .bind(timestamp)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Insert a record, remembering where its JSON file lives.
    pub async fn insert_with_path(&self, record: &NewRecord, file_path: Option<&Path>) -> Result<i64> {
        let record = prepare(record)?;
        let now = chrono::Utc::now().timestamp();
        let embeddings = record
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let file_path = file_path.map(|p| p.to_string_lossy().into_owned());

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO documents (url, type, timestamp, content, summary, embeddings,
                                   obsidian_markdown, search_text, file_path,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.url)
        .bind(record.content_type.as_str())
        .bind(record.timestamp)
        .bind(&record.content)
        .bind(&record.summary)
        .bind(&embeddings)
        .bind(&record.markdown)
        .bind(search_text(&record.content, record.summary.as_deref()))
        .bind(&file_path)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        insert_keywords(&mut tx, id, &record.keywords, now).await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Where each record's file lives, oldest capture first.
    pub async fn locations(&self) -> Result<Vec<RecordLocation>> {
        let rows = sqlx::query(
            "SELECT id, url, type, timestamp, file_path FROM documents ORDER BY timestamp, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RecordLocation> {
                let kind: String = row.try_get("type")?;
                let file_path: Option<String> = row.try_get("file_path")?;
                Ok(RecordLocation {
                    id: row.try_get("id")?,
                    url: row.try_get("url")?,
                    content_type: kind.parse()?,
                    timestamp: row.try_get("timestamp")?,
                    file_path: file_path.map(PathBuf::from),
                })
            })
            .collect()
    }
}

/// A record's identity and, when known, the file it was stored in.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLocation {
    pub id: i64,
    pub url: String,
    pub content_type: ContentType,
    pub timestamp: i64,
    pub file_path: Option<PathBuf>,
}

fn row_to_record(row: &SqliteRow) -> Result<ContentRecord> {
    let kind: String = row.try_get("type")?;
    let keywords_json: String = row.try_get("keywords")?;
    let embeddings: Option<String> = row.try_get("embeddings")?;

    Ok(ContentRecord {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        content_type: kind.parse()?,
        timestamp: row.try_get("timestamp")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        keywords: serde_json::from_str(&keywords_json)
            .with_context(|| format!("corrupt keyword list: {}", keywords_json))?,
        embedding: embeddings.as_deref().map(parse_embedding).transpose()?,
        markdown: row.try_get("obsidian_markdown")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn insert_keywords(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: i64,
    keywords: &[String],
    now: i64,
) -> Result<()> {
    for keyword in keywords {
        sqlx::query(
            "INSERT INTO keywords (document_id, keyword, keyword_norm, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(document_id)
        .bind(keyword)
        .bind(keyword_key(keyword))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, record: &NewRecord) -> Result<i64> {
        self.insert_with_path(record, None).await
    }

    async fn get(&self, id: i64) -> Result<Option<ContentRecord>> {
        let sql = format!("{} WHERE d.id = ?", SELECT_RECORD);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn update(&self, id: i64, patch: &RecordPatch) -> Result<bool> {
        let patch = prepare_patch(patch)?;
        if patch.is_empty() {
            return Ok(false);
        }
        let now = chrono::Utc::now().timestamp();
        let embeddings = patch
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE documents SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(url) = &patch.url {
                set.push("url = ").push_bind_unseparated(url.as_str());
            }
            if let Some(t) = patch.content_type {
                set.push("type = ").push_bind_unseparated(t.as_str());
            }
            if let Some(content) = &patch.content {
                set.push("content = ").push_bind_unseparated(content.as_str());
            }
            if let Some(summary) = &patch.summary {
                set.push("summary = ").push_bind_unseparated(summary.as_str());
            }
            if let Some(embeddings) = &embeddings {
                set.push("embeddings = ").push_bind_unseparated(embeddings.as_str());
            }
            if let Some(markdown) = &patch.markdown {
                set.push("obsidian_markdown = ").push_bind_unseparated(markdown.as_str());
            }
            set.push("updated_at = ").push_bind_unseparated(now);
        }
        qb.push(" WHERE id = ").push_bind(id);

        let affected = qb.build().execute(&mut *tx).await?.rows_affected();
        if affected == 0 {
            return Ok(false);
        }

        if patch.content.is_some() || patch.summary.is_some() {
            let row = sqlx::query("SELECT content, summary FROM documents WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            let summary: Option<String> = row.try_get("summary")?;
            sqlx::query("UPDATE documents SET search_text = ? WHERE id = ?")
                .bind(search_text(&row.try_get::<String, _>("content")?, summary.as_deref()))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(keywords) = &patch.keywords {
            sqlx::query("DELETE FROM keywords WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_keywords(&mut tx, id, keywords, now).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM keywords WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let affected = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(affected > 0)
    }

    async fn search(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<ContentRecord>> {
        if limit == 0 || criteria.matches_nothing() {
            return Ok(Vec::new());
        }
        let tokens = criteria.text_tokens();
        let keywords = criteria.keyword_filter();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_RECORD);
        qb.push(" WHERE 1 = 1");

        for token in &tokens {
            qb.push(" AND instr(d.search_text, ")
                .push_bind(token.as_str())
                .push(") > 0");
        }

        if let Some(keywords) = &keywords {
            qb.push(" AND d.id IN (SELECT document_id FROM keywords WHERE keyword_norm IN (");
            {
                let mut list = qb.separated(", ");
                for keyword in keywords {
                    list.push_bind(keyword.as_str());
                }
            }
            qb.push("))");
        }

        if let Some(t) = criteria.content_type {
            qb.push(" AND d.type = ").push_bind(t.as_str());
        }

        qb.push(" ORDER BY d.id LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }
}
