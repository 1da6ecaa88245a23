//! Core data models.
//!
//! | Type | Role |
//! |------|------|
//! | [`ContentType`] | Closed set of content categories assigned by classification |
//! | [`NewRecord`] | A fully-populated record handed in at the ingestion boundary |
//! | [`ContentRecord`] | A stored record, with its relational id and keyword list |
//! | [`RecordPatch`] | Partial update; only present fields are replaced |
//!
//! The JSON shape of [`NewRecord`] matches the on-disk record files:
//! `type`, `embeddings` and `obsidian_markdown` keep their historical names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Content category derived from a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "github")]
    Github,
    #[serde(rename = "github_ipynb")]
    GithubIpynb,
    #[serde(rename = "arxiv")]
    Arxiv,
    #[serde(rename = "youtube")]
    Youtube,
    #[serde(rename = "huggingface")]
    Huggingface,
    #[serde(rename = "general")]
    General,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Github,
        ContentType::GithubIpynb,
        ContentType::Arxiv,
        ContentType::Youtube,
        ContentType::Huggingface,
        ContentType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Github => "github",
            ContentType::GithubIpynb => "github_ipynb",
            ContentType::Arxiv => "arxiv",
            ContentType::Youtube => "youtube",
            ContentType::Huggingface => "huggingface",
            ContentType::General => "general",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| RecordError::UnknownType(s.to_string()))
    }
}

/// Validation failures at the ingestion boundary.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("unknown content type: '{0}'")]
    UnknownType(String),
    #[error("record url must not be empty")]
    EmptyUrl,
    #[error("record timestamp must be non-negative, got {0}")]
    NegativeTimestamp(i64),
    #[error("embedding contains a non-finite value at position {0}")]
    NonFiniteEmbedding(usize),
    #[error("invalid embedding encoding: {0}")]
    BadEmbedding(String),
}

/// A record as delivered by upstream extraction and summarization stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub timestamp: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(
        default,
        rename = "embeddings",
        deserialize_with = "deserialize_embedding",
        skip_serializing_if = "Option::is_none"
    )]
    pub embedding: Option<Vec<f32>>,
    #[serde(
        default,
        rename = "obsidian_markdown",
        skip_serializing_if = "Option::is_none"
    )]
    pub markdown: Option<String>,
}

impl NewRecord {
    pub fn new(
        url: impl Into<String>,
        content_type: ContentType,
        timestamp: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            content_type,
            timestamp,
            content: content.into(),
            summary: None,
            keywords: Vec::new(),
            embedding: None,
            markdown: None,
        }
    }

    /// Check the invariants every stored record must satisfy.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.url.trim().is_empty() {
            return Err(RecordError::EmptyUrl);
        }
        if self.timestamp < 0 {
            return Err(RecordError::NegativeTimestamp(self.timestamp));
        }
        if let Some(vec) = &self.embedding {
            check_finite(vec)?;
        }
        Ok(())
    }

    /// Trim keywords and drop blank ones, preserving order.
    pub fn normalize_keywords(&mut self) {
        self.keywords = clean_keywords(&self.keywords);
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRecord {
    pub id: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub timestamp: i64,
    pub content: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    #[serde(rename = "embeddings")]
    pub embedding: Option<Vec<f32>>,
    #[serde(rename = "obsidian_markdown")]
    pub markdown: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial update of a stored record.
///
/// There is deliberately no `timestamp` field: it is fixed at
/// classification time. Unknown fields (including `timestamp`) are
/// rejected when a patch is deserialized.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordPatch {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default, rename = "embeddings", deserialize_with = "deserialize_embedding")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, rename = "obsidian_markdown")]
    pub markdown: Option<String>,
}

impl RecordPatch {
    /// True if any non-keyword column would change.
    pub fn has_scalars(&self) -> bool {
        self.url.is_some()
            || self.content_type.is_some()
            || self.content.is_some()
            || self.summary.is_some()
            || self.embedding.is_some()
            || self.markdown.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_scalars() && self.keywords.is_none()
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(RecordError::EmptyUrl);
            }
        }
        if let Some(vec) = &self.embedding {
            check_finite(vec)?;
        }
        Ok(())
    }

    /// Apply this patch to a record in place. Used by the in-memory store.
    pub fn apply_to(&self, record: &mut ContentRecord) {
        if let Some(url) = &self.url {
            record.url = url.clone();
        }
        if let Some(t) = self.content_type {
            record.content_type = t;
        }
        if let Some(content) = &self.content {
            record.content = content.clone();
        }
        if let Some(summary) = &self.summary {
            record.summary = Some(summary.clone());
        }
        if let Some(keywords) = &self.keywords {
            record.keywords = clean_keywords(keywords);
        }
        if let Some(vec) = &self.embedding {
            record.embedding = Some(vec.clone());
        }
        if let Some(md) = &self.markdown {
            record.markdown = Some(md.clone());
        }
    }
}

pub fn clean_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn check_finite(vec: &[f32]) -> Result<(), RecordError> {
    match vec.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(RecordError::NonFiniteEmbedding(i)),
        None => Ok(()),
    }
}

/// Decode an embedding stored as text.
///
/// Accepts a JSON array (`"[0.1, 0.2]"`) or a bare comma-separated list
/// (`"0.1,0.2"`). Empty text decodes to an empty vector.
pub fn parse_embedding(text: &str) -> Result<Vec<f32>, RecordError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| RecordError::BadEmbedding(e.to_string()));
    }
    trimmed
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| RecordError::BadEmbedding(format!("'{}': {}", part.trim(), e)))
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEmbedding {
    Vector(Vec<f32>),
    Encoded(String),
}

fn deserialize_embedding<'de, D>(deserializer: D) -> Result<Option<Vec<f32>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawEmbedding>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawEmbedding::Vector(v)) => Ok(Some(v)),
        Some(RawEmbedding::Encoded(s)) => parse_embedding(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
