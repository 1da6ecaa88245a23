//! URL classification with storage path generation.
//!
//! Wraps the pure rule table from `knowledge_harness_core::classify` with
//! what it needs from the environment: a clock and a storage root. A URL
//! classified at unix time `T` maps to
//!
//! ```text
//! <root>/<YYYY-MM-DD of T in local time>/<slug>_<T>.json
//! ```
//!
//! Failing to create the dated directory means the environment is
//! misconfigured; [`Classifier::classify_or_exit`] reports it and
//! terminates the process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use thiserror::Error;

use knowledge_harness_core::classify::{self, UrlClass};
use knowledge_harness_core::models::ContentType;
use knowledge_harness_core::normalize::{clean_url, needs_reader_proxy, reader_proxy_url};

/// Exit status used when classification cannot create its directory.
pub const EXIT_STORAGE_UNAVAILABLE: i32 = 2;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("url is empty after normalization")]
    EmptyUrl,
    #[error("cannot create storage directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of capture timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock unix seconds.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock frozen at one instant.
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// How the extraction stage will fetch the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Fetch directly; PDFs are still routed through the reader proxy.
    Auto,
    /// Always fetch through the reader proxy.
    ReaderProxy,
}

/// Outcome of classifying one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub content_type: ContentType,
    pub path: PathBuf,
    pub timestamp: i64,
    /// Normalized URL, as stored.
    pub url: String,
    /// URL the extraction stage should fetch.
    pub fetch_url: String,
}

impl Classification {
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_string()
    }
}

pub struct Classifier {
    root: PathBuf,
    clock: Box<dyn Clock>,
    unique: bool,
    last: AtomicI64,
}

impl Classifier {
    /// Classifier over `root` using the system clock.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::with_clock(root, SystemClock)
    }

    pub fn with_clock(root: impl AsRef<Path>, clock: impl Clock + 'static) -> std::io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root.as_ref())?,
            clock: Box::new(clock),
            unique: true,
            last: AtomicI64::new(i64::MIN),
        })
    }

    /// Disable the per-process timestamp bump, so the same URL at the same
    /// second always yields the same path.
    pub fn deterministic(mut self) -> Self {
        self.unique = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a record file for `slug` captured at `timestamp`.
    pub fn path_for(&self, slug: &str, timestamp: i64) -> PathBuf {
        self.root
            .join(date_dir(timestamp))
            .join(format!("{}_{}.json", slug, timestamp))
    }

    /// Path a stored record would have been written to.
    pub fn path_for_url(&self, url: &str, content_type: ContentType, timestamp: i64) -> PathBuf {
        let class = classify::classify(url);
        let slug = if class.content_type == content_type {
            class.slug
        } else {
            classify::general_slug(url)
        };
        self.path_for(&slug, timestamp)
    }

    fn next_timestamp(&self) -> i64 {
        let now = self.clock.now();
        if !self.unique {
            return now;
        }
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|v| v);
        now.max(prev.saturating_add(1))
    }

    /// Classify without touching the filesystem.
    pub fn plan(&self, raw_url: &str, route: Route) -> Result<Classification, ClassifyError> {
        let url = clean_url(raw_url);
        if url.is_empty() {
            return Err(ClassifyError::EmptyUrl);
        }

        let proxied = route == Route::ReaderProxy || needs_reader_proxy(&url);
        let UrlClass {
            content_type, slug, ..
        } = if proxied {
            classify::general(&url)
        } else {
            classify::classify(&url)
        };

        let timestamp = self.next_timestamp();
        let fetch_url = if proxied {
            reader_proxy_url(&url)
        } else {
            url.clone()
        };

        Ok(Classification {
            content_type,
            path: self.path_for(&slug, timestamp),
            timestamp,
            url,
            fetch_url,
        })
    }

    /// Classify a URL and create the directory its record will live in.
    pub fn classify_and_path(&self, raw_url: &str, route: Route) -> Result<Classification, ClassifyError> {
        let classification = self.plan(raw_url, route)?;
        if let Some(dir) = classification.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ClassifyError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        tracing::debug!(
            url = %classification.url,
            content_type = %classification.content_type,
            path = %classification.path.display(),
            "classified"
        );
        Ok(classification)
    }

    /// Like [`classify_and_path`](Self::classify_and_path), but a directory
    /// creation failure terminates the process with
    /// [`EXIT_STORAGE_UNAVAILABLE`].
    pub fn classify_or_exit(&self, raw_url: &str, route: Route) -> Result<Classification, ClassifyError> {
        match self.classify_and_path(raw_url, route) {
            Err(err @ ClassifyError::CreateDir { .. }) => {
                tracing::error!(error = %err, "storage directory unavailable");
                eprintln!("fatal: {}", err);
                eprintln!(
                    "hint: check that storage.root ({}) exists or can be created, is writable, and the disk is not full",
                    self.root.display()
                );
                std::process::exit(EXIT_STORAGE_UNAVAILABLE);
            }
            other => other,
        }
    }
}

/// `kb classify`: show where a URL would be stored, without writing.
pub fn run_classify(config: &crate::config::Config, url: &str, route: Route) -> anyhow::Result<()> {
    let classifier = Classifier::new(&config.storage.root)?;
    let c = classifier.plan(url, route)?;

    println!("url:        {}", c.url);
    println!("type:       {}", c.content_type);
    println!("timestamp:  {}", c.timestamp_string());
    println!("path:       {}", c.path.display());
    if c.fetch_url != c.url {
        println!("fetch via:  {}", c.fetch_url);
    }
    Ok(())
}

fn date_dir(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d")
        .to_string()
}
