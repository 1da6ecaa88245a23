//! # Knowledge Harness CLI (`kb`)
//!
//! The `kb` binary classifies URLs, stores records, and queries the
//! knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database, schema, and storage root |
//! | `kb classify <url>` | Show a URL's type and record path without writing |
//! | `kb ingest <url>` | Classify a URL and store a record for it |
//! | `kb get <id>` | Print a record |
//! | `kb update <id>` | Patch a record |
//! | `kb delete <id>` | Delete a record |
//! | `kb search` | Filter records by text, keywords, and type |
//! | `kb recent` | Most recently captured records |
//! | `kb related <id>` | Records ranked by keyword overlap |
//! | `kb load <dir>` | Import record files missing from the database |
//! | `kb index list` | Print the flat index |
//! | `kb index rebuild` | Regenerate the flat index from the database |
//! | `kb stats` | Store statistics |
//! | `kb types` | List content types |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! kb init --config ./config/kb.toml
//!
//! # Store a paper with its summary and keywords
//! kb ingest https://arxiv.org/abs/1706.03762 \
//!     --content-file paper.txt --summary "Attention is all you need" \
//!     --keyword transformers --keyword attention
//!
//! # Records tagged with either keyword, restricted to papers
//! kb search --keyword attention --keyword rnn --type arxiv
//!
//! # What else is like record 1?
//! kb related 1 --limit 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use knowledge_harness::classifier::{self, Route};
use knowledge_harness::config;
use knowledge_harness::edit;
use knowledge_harness::get;
use knowledge_harness::index;
use knowledge_harness::ingest::{self, IngestRequest};
use knowledge_harness::migrate;
use knowledge_harness::related;
use knowledge_harness::search;
use knowledge_harness::stats;
use knowledge_harness_core::models::{parse_embedding, ContentType, RecordPatch};
use knowledge_harness_core::search::SearchCriteria;

/// Knowledge Harness CLI: a local knowledge base for documents found at
/// arbitrary URLs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Knowledge Harness: classify, store, search, and relate documents from URLs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kb.toml`.
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    /// Log at debug level (overrides `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and storage root.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Classify a URL and show where its record would be stored.
    ///
    /// Nothing is written.
    Classify {
        url: String,

        /// Route the fetch through the reader proxy (forces `general`).
        #[arg(long)]
        reader_proxy: bool,
    },

    /// Classify a URL and store a record for it.
    Ingest {
        url: String,

        #[command(flatten)]
        record: RecordArgs,

        /// Route the fetch through the reader proxy (forces `general`).
        #[arg(long)]
        reader_proxy: bool,
    },

    /// Print a record by id.
    Get {
        id: i64,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Update fields of a record. The capture timestamp cannot change.
    ///
    /// Fields come from flags, from a JSON `--patch-file`, or both; flags
    /// win. `--keyword` replaces the whole keyword set.
    Update {
        id: i64,

        #[arg(long)]
        url: Option<String>,

        #[arg(long = "type")]
        content_type: Option<ContentType>,

        #[command(flatten)]
        record: RecordArgs,

        /// JSON file with any of: url, type, content, summary, keywords,
        /// embeddings, obsidian_markdown.
        #[arg(long)]
        patch_file: Option<PathBuf>,
    },

    /// Delete a record and its keywords.
    Delete { id: i64 },

    /// Search records. All given filters must hold.
    Search {
        /// Every whitespace-separated word must occur in the content or
        /// summary (case-insensitive).
        #[arg(long)]
        text: Option<String>,

        /// Match records carrying any of these keywords (repeatable).
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Restrict to one content type.
        #[arg(long = "type")]
        content_type: Option<ContentType>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Most recently captured records.
    Recent {
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Records ranked by keyword overlap with record `<id>`.
    Related {
        id: i64,

        /// Rank against these keywords instead of the record's own.
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Insert record files under a directory that the database lacks.
    ///
    /// Records already present (same url and timestamp) are skipped.
    Load { dir: PathBuf },

    /// Inspect or rebuild the flat index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show store statistics.
    Stats,

    /// List content types.
    Types,
}

/// Flat index subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Print index entries.
    List {
        #[arg(long = "type")]
        content_type: Option<ContentType>,
    },
    /// Regenerate the index from the database.
    Rebuild,
}

/// Record fields shared by `ingest` and `update`.
#[derive(clap::Args)]
struct RecordArgs {
    /// Record content, inline.
    #[arg(long, conflicts_with = "content_file")]
    content: Option<String>,

    /// Read record content from a file.
    #[arg(long)]
    content_file: Option<PathBuf>,

    #[arg(long)]
    summary: Option<String>,

    /// Keyword (repeatable).
    #[arg(long = "keyword")]
    keywords: Vec<String>,

    /// Embedding vector as a JSON array or comma-separated floats.
    #[arg(long, allow_hyphen_values = true)]
    embeddings: Option<String>,

    /// Read Obsidian-formatted markdown from a file.
    #[arg(long)]
    markdown_file: Option<PathBuf>,
}

impl RecordArgs {
    fn content(&self) -> anyhow::Result<Option<String>> {
        match (&self.content, &self.content_file) {
            (Some(text), _) => Ok(Some(text.clone())),
            (None, Some(path)) => read_text(path).map(Some),
            (None, None) => Ok(None),
        }
    }

    fn embedding(&self) -> anyhow::Result<Option<Vec<f32>>> {
        self.embeddings
            .as_deref()
            .map(parse_embedding)
            .transpose()
            .context("Invalid --embeddings")
    }

    fn markdown(&self) -> anyhow::Result<Option<String>> {
        self.markdown_file.as_deref().map(read_text).transpose()
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn route(reader_proxy: bool) -> Route {
    if reader_proxy {
        Route::ReaderProxy
    } else {
        Route::Auto
    }
}

fn print_types() {
    for t in ContentType::ALL {
        println!("{}", t);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if matches!(cli.command, Commands::Types) {
        print_types();
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_init(&cfg).await?;
        }
        Commands::Classify { url, reader_proxy } => {
            classifier::run_classify(&cfg, &url, route(reader_proxy))?;
        }
        Commands::Ingest {
            url,
            record,
            reader_proxy,
        } => {
            let Some(content) = record.content()? else {
                bail!("ingest needs --content or --content-file");
            };
            let mut req = IngestRequest::new(url, content);
            req.route = route(reader_proxy);
            req.summary = record.summary.clone();
            req.keywords = record.keywords.clone();
            req.embedding = record.embedding()?;
            req.markdown = record.markdown()?;
            ingest::run_ingest(&cfg, &req).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, id, json).await?;
        }
        Commands::Update {
            id,
            url,
            content_type,
            record,
            patch_file,
        } => {
            let from_flags = RecordPatch {
                url,
                content_type,
                content: record.content()?,
                summary: record.summary.clone(),
                keywords: (!record.keywords.is_empty()).then(|| record.keywords.clone()),
                embedding: record.embedding()?,
                markdown: record.markdown()?,
            };
            let patch = match patch_file {
                Some(path) => edit::merge_patch(edit::read_patch_file(&path)?, from_flags),
                None => from_flags,
            };
            edit::run_update(&cfg, id, &patch).await?;
        }
        Commands::Delete { id } => {
            edit::run_delete(&cfg, id).await?;
        }
        Commands::Search {
            text,
            keywords,
            content_type,
            limit,
            json,
        } => {
            let mut criteria = SearchCriteria::new();
            if let Some(text) = text {
                criteria = criteria.text(text);
            }
            if !keywords.is_empty() {
                criteria = criteria.keywords(keywords);
            }
            if let Some(t) = content_type {
                criteria = criteria.content_type(t);
            }
            search::run_search(&cfg, &criteria, limit, json).await?;
        }
        Commands::Recent { limit, json } => {
            search::run_recent(&cfg, limit, json).await?;
        }
        Commands::Related {
            id,
            keywords,
            limit,
            json,
        } => {
            related::run_related(&cfg, id, &keywords, limit, json).await?;
        }
        Commands::Load { dir } => {
            ingest::run_load(&cfg, &dir).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::List { content_type } => {
                index::run_index_list(&cfg, content_type)?;
            }
            IndexAction::Rebuild => {
                index::run_index_rebuild(&cfg).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Types => print_types(),
    }

    Ok(())
}
