use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use knowledge_harness_core::search::{keyword_key, search_text};

use crate::config::Config;
use crate::db;

/// Create the schema. Every statement is idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            type TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            content TEXT NOT NULL,
            summary TEXT,
            embeddings TEXT,
            obsidian_markdown TEXT,
            search_text TEXT NOT NULL DEFAULT '',
            file_path TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create keywords table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keywords (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            keyword TEXT NOT NULL,
            keyword_norm TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Columns added after the first schema
    add_column_if_missing(pool, "documents", "search_text", "TEXT NOT NULL DEFAULT ''").await?;
    add_column_if_missing(pool, "documents", "file_path", "TEXT").await?;
    add_column_if_missing(pool, "keywords", "keyword_norm", "TEXT NOT NULL DEFAULT ''").await?;
    backfill_folded_text(pool).await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(type)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_timestamp ON documents(timestamp DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keywords_keyword ON keywords(keyword)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keywords_document_id ON keywords(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keywords_keyword_norm ON keywords(keyword_norm)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<()> {
    let present: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?) WHERE name = ?)",
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;

    if !present {
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))
            .execute(pool)
            .await?;
        tracing::info!(table, column, "added column");
    }
    Ok(())
}

/// Fill case-folded columns left empty by databases created before they
/// existed. SQLite's `lower()` only folds ASCII, so folding happens here.
async fn backfill_folded_text(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    let docs = sqlx::query(
        "SELECT id, content, summary FROM documents WHERE search_text = ''",
    )
    .fetch_all(&mut *tx)
    .await?;
    for row in &docs {
        let summary: Option<String> = row.try_get("summary")?;
        sqlx::query("UPDATE documents SET search_text = ? WHERE id = ?")
            .bind(search_text(&row.try_get::<String, _>("content")?, summary.as_deref()))
            .bind(row.try_get::<i64, _>("id")?)
            .execute(&mut *tx)
            .await?;
    }

    let keywords = sqlx::query("SELECT id, keyword FROM keywords WHERE keyword_norm = ''")
        .fetch_all(&mut *tx)
        .await?;
    for row in &keywords {
        sqlx::query("UPDATE keywords SET keyword_norm = ? WHERE id = ?")
            .bind(keyword_key(&row.try_get::<String, _>("keyword")?))
            .bind(row.try_get::<i64, _>("id")?)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    if !docs.is_empty() || !keywords.is_empty() {
        tracing::info!(
            documents = docs.len(),
            keywords = keywords.len(),
            "backfilled case-folded search columns"
        );
    }
    Ok(())
}

/// `kb init`: create the database, its schema, and the storage root.
pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    let migrated = run_migrations(&pool).await;
    pool.close().await;
    migrated?;

    std::fs::create_dir_all(&config.storage.root).with_context(|| {
        format!(
            "Failed to create storage root: {}",
            config.storage.root.display()
        )
    })?;

    println!("Database initialized: {}", config.db.path.display());
    println!("Storage root: {}", config.storage.root.display());
    Ok(())
}
