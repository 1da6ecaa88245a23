//! Search criteria and store-agnostic search helpers.
//!
//! A search is three independent, optional predicates combined with AND:
//!
//! - `text`: split into alphanumeric tokens; every token must occur
//!   (case-insensitively) in the record's content or summary.
//! - `keywords`: the record must carry at least one of them
//!   (case-insensitive). An explicitly empty list matches nothing.
//! - `type`: exact match on the content type.
//!
//! Empty criteria apply no filter. Backends return matches in no particular
//! order; [`most_recent`] sorts by timestamp for callers that need it.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{clean_keywords, ContentRecord, ContentType};
use crate::store::Store;

/// Filter over stored records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.keywords.is_none() && self.content_type.is_none()
    }

    /// Lower-cased text tokens. Empty when there is no text filter.
    pub fn text_tokens(&self) -> Vec<String> {
        self.text.as_deref().map(tokenize).unwrap_or_default()
    }

    /// Lower-cased, trimmed keyword filter.
    pub fn keyword_filter(&self) -> Option<Vec<String>> {
        self.keywords
            .as_ref()
            .map(|k| clean_keywords(k).iter().map(|s| keyword_key(s)).collect())
    }

    /// True if the keyword filter is present but can never match.
    pub fn matches_nothing(&self) -> bool {
        self.keyword_filter().is_some_and(|k| k.is_empty())
    }

    /// Evaluate the criteria against a record in memory.
    pub fn matches(&self, record: &ContentRecord) -> bool {
        if let Some(t) = self.content_type {
            if record.content_type != t {
                return false;
            }
        }

        if let Some(wanted) = self.keyword_filter() {
            let hit = record
                .keywords
                .iter()
                .any(|k| wanted.contains(&keyword_key(k)));
            if !hit {
                return false;
            }
        }

        let tokens = self.text_tokens();
        if !tokens.is_empty() {
            let haystack = search_text(&record.content, record.summary.as_deref());
            if !tokens.iter().all(|t| haystack.contains(t.as_str())) {
                return false;
            }
        }

        true
    }
}

/// Case-folded form a keyword is matched by.
///
/// Backends that cannot fold Unicode case themselves store this alongside
/// the keyword.
pub fn keyword_key(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

/// Case-folded text that text tokens are matched against.
pub fn search_text(content: &str, summary: Option<&str>) -> String {
    format!("{} {}", content, summary.unwrap_or("")).to_lowercase()
}

/// Split text into lower-cased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Run a search against any [`Store`], logging backend failures.
pub async fn search<S: Store + ?Sized>(
    store: &S,
    criteria: &SearchCriteria,
    limit: usize,
) -> Result<Vec<ContentRecord>> {
    if limit == 0 || criteria.matches_nothing() {
        return Ok(Vec::new());
    }
    store
        .search(criteria, limit)
        .await
        .inspect_err(|e| tracing::error!(error = %e, ?criteria, "search failed"))
}

/// Order records newest first (ties broken by higher id).
pub fn sort_recent(records: &mut [ContentRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

/// The `n` most recently captured records.
pub async fn most_recent<S: Store + ?Sized>(store: &S, n: usize) -> Result<Vec<ContentRecord>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut all = search(store, &SearchCriteria::new(), usize::MAX).await?;
    sort_recent(&mut all);
    all.truncate(n);
    Ok(all)
}
