//! Related-content ranking.
//!
//! Records are related by keyword overlap. For a subject keyword set `S`
//! and a candidate set `C` (both compared case-insensitively):
//!
//! ```text
//! jaccard = |S ∩ C| / |S ∪ C|          (0.0 if either set is empty)
//! boost   = min(0.1 × |S ∩ C|, 0.5)
//! score   = min(jaccard + boost, 1.0)
//! ```
//!
//! Candidates come from a keyword ANY-of search over-fetched by a factor
//! (default 3) so that ranking has something to choose from. The subject
//! itself is never returned, and ties keep fetch order.

use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;

use crate::models::ContentRecord;
use crate::search::{keyword_key, search, SearchCriteria};
use crate::store::Store;

/// Default candidate over-fetch factor.
pub const DEFAULT_OVERFETCH: usize = 3;

const BOOST_PER_SHARED_KEYWORD: f64 = 0.1;
const MAX_BOOST: f64 = 0.5;

/// Inputs for a single [`related`] call.
#[derive(Debug, Clone)]
pub struct RelatedRequest<'a> {
    pub subject_id: i64,
    /// Use these keywords instead of the subject's stored ones.
    pub keywords: Option<&'a [String]>,
    pub limit: usize,
    pub overfetch: usize,
}

impl<'a> RelatedRequest<'a> {
    pub fn new(subject_id: i64, limit: usize) -> Self {
        Self {
            subject_id,
            keywords: None,
            limit,
            overfetch: DEFAULT_OVERFETCH,
        }
    }

    pub fn with_keywords(mut self, keywords: &'a [String]) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch;
        self
    }
}

/// A candidate with its relatedness score.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedItem {
    pub score: f64,
    #[serde(flatten)]
    pub record: ContentRecord,
}

fn keyword_set(keywords: &[String]) -> HashSet<String> {
    keywords
        .iter()
        .map(|k| keyword_key(k))
        .filter(|k| !k.is_empty())
        .collect()
}

/// Relatedness of two keyword lists, in `[0.0, 1.0]`. Symmetric.
pub fn score(subject: &[String], candidate: &[String]) -> f64 {
    let a = keyword_set(subject);
    let b = keyword_set(candidate);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    let jaccard = intersection as f64 / union as f64;
    let boost = (intersection as f64 * BOOST_PER_SHARED_KEYWORD).min(MAX_BOOST);
    (jaccard + boost).min(1.0)
}

/// Score and order candidates, dropping `exclude_id` and keeping the top
/// `limit`. The sort is stable.
pub fn rank(
    subject_keywords: &[String],
    candidates: Vec<ContentRecord>,
    exclude_id: Option<i64>,
    limit: usize,
) -> Vec<RelatedItem> {
    let mut items: Vec<RelatedItem> = candidates
        .into_iter()
        .filter(|c| Some(c.id) != exclude_id)
        .map(|record| RelatedItem {
            score: score(subject_keywords, &record.keywords),
            record,
        })
        .collect();
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    items.truncate(limit);
    items
}

/// Find records related to `req.subject_id`.
///
/// A subject that cannot be found yields an empty list and an error log
/// entry, not an `Err`.
pub async fn related<S: Store + ?Sized>(
    store: &S,
    req: &RelatedRequest<'_>,
) -> Result<Vec<RelatedItem>> {
    if req.limit == 0 {
        return Ok(Vec::new());
    }

    let subject_keywords: Vec<String> = match req.keywords {
        Some(explicit) => explicit.to_vec(),
        None => match store.get(req.subject_id).await? {
            Some(subject) => subject.keywords,
            None => {
                tracing::error!(subject_id = req.subject_id, "related: subject record not found");
                return Ok(Vec::new());
            }
        },
    };

    if keyword_set(&subject_keywords).is_empty() {
        tracing::debug!(subject_id = req.subject_id, "related: subject has no keywords");
        return Ok(Vec::new());
    }

    let fetch = req.limit.saturating_mul(req.overfetch.max(1));
    let criteria = SearchCriteria::new().keywords(subject_keywords.iter().cloned());
    let candidates = search(store, &criteria, fetch).await?;
    tracing::debug!(
        subject_id = req.subject_id,
        candidates = candidates.len(),
        "related: ranking candidates"
    );

    Ok(rank(
        &subject_keywords,
        candidates,
        Some(req.subject_id),
        req.limit,
    ))
}
