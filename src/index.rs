//! Append-only flat index of stored record files.
//!
//! One line per successful store, `type,timestamp,path`:
//!
//! ```text
//! github,1640995200,/home/me/kb/2022-01-01/github_user_repo_1640995200.json
//! ```
//!
//! Appends take an exclusive advisory lock (`fs2`), so concurrent `kb`
//! processes never interleave partial lines. The relational store is the
//! source of truth: [`rebuild`] regenerates the whole file from it.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::Serialize;

use knowledge_harness_core::models::ContentType;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::content_store::ContentStore;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub timestamp: i64,
    pub path: PathBuf,
}

impl IndexEntry {
    pub fn to_line(&self) -> String {
        format!("{},{},{}", self.content_type, self.timestamp, self.path.display())
    }

    /// Parse one index line. The path is everything after the second comma.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.splitn(3, ',');
        let (Some(kind), Some(ts), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            bail!("expected 'type,timestamp,path', got '{}'", line);
        };
        if path.is_empty() {
            bail!("empty path in index line '{}'", line);
        }
        Ok(Self {
            content_type: kind.parse()?,
            timestamp: ts
                .trim()
                .parse()
                .with_context(|| format!("bad timestamp '{}'", ts))?,
            path: PathBuf::from(path),
        })
    }
}

pub struct FlatIndex {
    path: PathBuf,
}

impl FlatIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create index directory: {}", parent.display())
                })?;
            }
        }
        Ok(())
    }

    /// Append one entry under an exclusive lock.
    pub fn append(&self, entry: &IndexEntry) -> Result<()> {
        self.ensure_parent()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open index file: {}", self.path.display()))?;

        FileExt::lock_exclusive(&file).context("Failed to acquire lock on index file")?;
        writeln!(file, "{}", entry.to_line()).context("Failed to write index entry")?;
        file.flush().context("Failed to flush index file")?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// All well-formed entries in file order. Malformed lines are skipped
    /// with a warning; a missing file is an empty index.
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to open index file: {}", self.path.display())
                })
            }
        };
        FileExt::lock_shared(&file).context("Failed to acquire lock on index file")?;

        let mut entries = Vec::new();
        for (n, line) in BufReader::new(&file).lines().enumerate() {
            let line = line.context("Failed to read index file")?;
            if line.trim().is_empty() {
                continue;
            }
            match IndexEntry::parse_line(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping malformed index line"),
            }
        }
        Ok(entries)
    }

    /// Replace the index contents with `entries`.
    pub fn rewrite(&self, entries: &[IndexEntry]) -> Result<()> {
        self.ensure_parent()?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("Failed to open index file: {}", self.path.display()))?;

        FileExt::lock_exclusive(&file).context("Failed to acquire lock on index file")?;
        file.set_len(0).context("Failed to truncate index file")?;
        for entry in entries {
            writeln!(file, "{}", entry.to_line()).context("Failed to write index entry")?;
        }
        file.flush().context("Failed to flush index file")?;
        Ok(())
    }
}

/// Regenerate the flat index from the relational store.
///
/// Each entry points at the file the record was stored in or loaded from.
/// Rows without a recorded file fall back to the path the classifier would
/// give them. Entries are ordered by capture time. Returns the number
/// written.
pub async fn rebuild(
    store: &SqliteStore,
    classifier: &Classifier,
    index: &FlatIndex,
) -> Result<usize> {
    let entries: Vec<IndexEntry> = store
        .locations()
        .await?
        .into_iter()
        .map(|loc| IndexEntry {
            content_type: loc.content_type,
            timestamp: loc.timestamp,
            path: loc.file_path.unwrap_or_else(|| {
                classifier.path_for_url(&loc.url, loc.content_type, loc.timestamp)
            }),
        })
        .collect();

    index.rewrite(&entries)?;
    tracing::info!(entries = entries.len(), path = %index.path().display(), "index rebuilt");
    Ok(entries.len())
}

pub fn run_index_list(config: &Config, content_type: Option<ContentType>) -> Result<()> {
    let index = FlatIndex::new(config.storage.index_path());
    let entries: Vec<IndexEntry> = index
        .entries()?
        .into_iter()
        .filter(|e| content_type.map_or(true, |t| e.content_type == t))
        .collect();

    if entries.is_empty() {
        println!("No index entries.");
        return Ok(());
    }
    for e in &entries {
        println!("{}", e.to_line());
    }
    Ok(())
}

pub async fn run_index_rebuild(config: &Config) -> Result<()> {
    let classifier = Classifier::new(&config.storage.root)?;
    let store = ContentStore::open(config).await?;
    let written = rebuild(store.records(), &classifier, store.index()).await;
    store.close().await;
    let written = written?;

    println!("index rebuild");
    println!("  path: {}", config.storage.index_path().display());
    println!("  entries: {}", written);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(ts: i64, path: &str) -> IndexEntry {
        IndexEntry {
            content_type: ContentType::Arxiv,
            timestamp: ts,
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_line_format() {
        let e = entry(1640995200, "/kb/2022-01-01/arxiv_1234.5678_1640995200.json");
        assert_eq!(
            e.to_line(),
            "arxiv,1640995200,/kb/2022-01-01/arxiv_1234.5678_1640995200.json"
        );
        assert_eq!(IndexEntry::parse_line(&e.to_line()).unwrap(), e);
    }

    #[test]
    fn test_parse_path_with_commas() {
        let parsed = IndexEntry::parse_line("general,5,/kb/a,b,c.json").unwrap();
        assert_eq!(parsed.path, PathBuf::from("/kb/a,b,c.json"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(IndexEntry::parse_line("nonsense").is_err());
        assert!(IndexEntry::parse_line("podcast,1,/x").is_err());
        assert!(IndexEntry::parse_line("general,abc,/x").is_err());
        assert!(IndexEntry::parse_line("general,1,").is_err());
    }

    #[test]
    fn test_append_and_read() {
        let tmp = TempDir::new().unwrap();
        let index = FlatIndex::new(tmp.path().join("nested/index.csv"));
        assert!(index.entries().unwrap().is_empty());

        index.append(&entry(1, "/a.json")).unwrap();
        index.append(&entry(2, "/b.json")).unwrap();

        let entries = index.entries().unwrap();
        assert_eq!(entries, vec![entry(1, "/a.json"), entry(2, "/b.json")]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.csv");
        std::fs::write(&path, "arxiv,1,/a.json\nbroken line\n\narxiv,2,/b.json\n").unwrap();
        let entries = FlatIndex::new(&path).entries().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let index = FlatIndex::new(tmp.path().join("index.csv"));
        for i in 0..5 {
            index.append(&entry(i, "/old.json")).unwrap();
        }
        index.rewrite(&[entry(9, "/new.json")]).unwrap();
        assert_eq!(index.entries().unwrap(), vec![entry(9, "/new.json")]);
        let raw = std::fs::read_to_string(index.path()).unwrap();
        assert_eq!(raw, "arxiv,9,/new.json\n");
    }
}
