//! TOML configuration.
//!
//! Every component receives its settings from an explicit [`Config`] value
//! loaded once by the CLI; there is no process-wide default.
//!
//! ```toml
//! [db]
//! path = "./data/kb.sqlite"
//!
//! [storage]
//! root = "./data/kb"
//!
//! [retrieval]
//! default_limit = 10
//! related_overfetch = 3
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory under which dated record directories are created.
    pub root: PathBuf,
    /// Flat index file name, relative to `root` unless absolute.
    #[serde(default = "default_index_file")]
    pub index_file: PathBuf,
}

fn default_index_file() -> PathBuf {
    PathBuf::from("index.csv")
}

impl StorageConfig {
    pub fn index_path(&self) -> PathBuf {
        self.root.join(&self.index_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_related_overfetch")]
    pub related_overfetch: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            related_overfetch: default_related_overfetch(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_related_overfetch() -> usize {
    knowledge_harness_core::related::DEFAULT_OVERFETCH
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }
    if config.storage.root.as_os_str().is_empty() {
        anyhow::bail!("storage.root must not be empty");
    }
    if config.storage.index_file.as_os_str().is_empty() {
        anyhow::bail!("storage.index_file must not be empty");
    }
    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.related_overfetch < 1 {
        anyhow::bail!("retrieval.related_overfetch must be >= 1");
    }
    Ok(())
}
