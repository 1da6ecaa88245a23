//! URL classification.
//!
//! Classification is an ordered table of [`Rule`]s evaluated top to bottom;
//! the first rule whose predicate matches *and* whose slug builder can
//! derive a slug wins. A URL that no rule claims is `general`, with a slug
//! made of the URL's alphanumeric characters.
//!
//! | Priority | Rule | Type | Slug |
//! |----------|------|------|------|
//! | 1 | GitHub notebook | `github_ipynb` | `github_ipynb_<user>_<repo>_<file>` |
//! | 2 | GitHub repository | `github` | `github_<user>_<repo>` |
//! | 3 | arXiv | `arxiv` | `arxiv_<id>` |
//! | 4 | WeChat article | `general` | `wechat_<id>` |
//! | 5 | YouTube | `youtube` | `youtube_<video-id>` |
//! | 6 | HuggingFace | `huggingface` | `huggingface_<org>_<model>` |
//!
//! New content sources are added by appending to [`RULES`].

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::models::ContentType;
use crate::normalize::host_matches;

/// Maximum length of a `general` slug.
pub const GENERAL_SLUG_MAX: usize = 100;

static ARXIV_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}\.\d{4,5}(?:v\d+)?)").unwrap());

/// One entry of the classification table.
pub struct Rule {
    pub name: &'static str,
    pub content_type: ContentType,
    pub matches: fn(&Url) -> bool,
    pub slug: fn(&Url) -> Option<String>,
}

/// Classification table, in priority order.
pub static RULES: &[Rule] = &[
    Rule {
        name: "github-notebook",
        content_type: ContentType::GithubIpynb,
        matches: is_github_notebook,
        slug: github_notebook_slug,
    },
    Rule {
        name: "github-repo",
        content_type: ContentType::Github,
        matches: is_github,
        slug: github_repo_slug,
    },
    Rule {
        name: "arxiv",
        content_type: ContentType::Arxiv,
        matches: is_arxiv,
        slug: arxiv_slug,
    },
    Rule {
        name: "wechat-article",
        content_type: ContentType::General,
        matches: is_wechat,
        slug: wechat_slug,
    },
    Rule {
        name: "youtube",
        content_type: ContentType::Youtube,
        matches: is_youtube,
        slug: youtube_slug,
    },
    Rule {
        name: "huggingface",
        content_type: ContentType::Huggingface,
        matches: is_huggingface,
        slug: huggingface_slug,
    },
];

/// Result of classifying a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlClass {
    pub content_type: ContentType,
    pub slug: String,
    /// Name of the rule that matched, or `"general"` for the fallback.
    pub rule: &'static str,
}

/// Classify a (normalized) URL.
pub fn classify(url: &str) -> UrlClass {
    if let Ok(parsed) = Url::parse(url) {
        for rule in RULES {
            if !(rule.matches)(&parsed) {
                continue;
            }
            if let Some(slug) = (rule.slug)(&parsed) {
                return UrlClass {
                    content_type: rule.content_type,
                    slug,
                    rule: rule.name,
                };
            }
        }
    }
    general(url)
}

/// The fallback classification.
pub fn general(url: &str) -> UrlClass {
    UrlClass {
        content_type: ContentType::General,
        slug: general_slug(url),
        rule: "general",
    }
}

/// All ASCII alphanumerics of `url`, truncated to [`GENERAL_SLUG_MAX`].
pub fn general_slug(url: &str) -> String {
    let slug: String = url
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(GENERAL_SLUG_MAX)
        .collect();
    if slug.is_empty() {
        "general".to_string()
    } else {
        slug
    }
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn host_is(url: &Url, domain: &str) -> bool {
    url.host_str().is_some_and(|h| host_matches(h, domain))
}

fn is_github(url: &Url) -> bool {
    host_is(url, "github.com")
}

fn is_github_notebook(url: &Url) -> bool {
    is_github(url) && url.path().to_ascii_lowercase().ends_with(".ipynb")
}

fn github_notebook_slug(url: &Url) -> Option<String> {
    let segs = segments(url);
    if segs.len() < 3 {
        return None;
    }
    let file = segs[segs.len() - 1].replace('.', "_");
    Some(format!(
        "github_ipynb_{}_{}_{}",
        sanitize(segs[0]),
        sanitize(segs[1]),
        sanitize(&file)
    ))
}

fn github_repo_slug(url: &Url) -> Option<String> {
    let segs = segments(url);
    if segs.len() < 2 {
        return None;
    }
    let repo = segs[1].strip_suffix(".git").unwrap_or(segs[1]);
    Some(format!("github_{}_{}", sanitize(segs[0]), sanitize(repo)))
}

fn is_arxiv(url: &Url) -> bool {
    host_is(url, "arxiv.org")
}

fn arxiv_slug(url: &Url) -> Option<String> {
    if let Some(m) = ARXIV_ID.captures(url.path()).and_then(|c| c.get(1)) {
        return Some(format!("arxiv_{}", m.as_str()));
    }
    // Pre-2007 identifiers look like `hep-th/9901001`.
    let segs = segments(url);
    match segs.split_first() {
        Some((kind, rest)) if matches!(*kind, "abs" | "pdf" | "html") && !rest.is_empty() => {
            let id = rest.join("_");
            let id = id.strip_suffix(".pdf").unwrap_or(&id);
            Some(format!("arxiv_{}", sanitize(id)))
        }
        _ => None,
    }
}

fn is_wechat(url: &Url) -> bool {
    url.host_str() == Some("mp.weixin.qq.com")
}

fn wechat_slug(url: &Url) -> Option<String> {
    let segs = segments(url);
    if segs.len() >= 2 && segs[0] == "s" {
        return Some(format!("wechat_{}", sanitize(segs[1])));
    }
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    match (param("__biz"), param("mid")) {
        (Some(biz), Some(mid)) => Some(format!("wechat_{}_{}", sanitize(&biz), sanitize(&mid))),
        _ => None,
    }
}

fn is_youtube(url: &Url) -> bool {
    host_is(url, "youtube.com") || host_is(url, "youtu.be") || host_is(url, "youtube-nocookie.com")
}

fn youtube_slug(url: &Url) -> Option<String> {
    let segs = segments(url);
    let id = if host_is(url, "youtu.be") {
        segs.first().map(|s| s.to_string())
    } else if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        Some(v.into_owned())
    } else {
        match segs.as_slice() {
            [kind, id, ..] if matches!(*kind, "embed" | "v" | "shorts" | "live") => {
                Some(id.to_string())
            }
            _ => None,
        }
    };
    id.filter(|id| !id.is_empty())
        .map(|id| format!("youtube_{}", sanitize(&id)))
}

fn is_huggingface(url: &Url) -> bool {
    host_is(url, "huggingface.co")
}

fn huggingface_slug(url: &Url) -> Option<String> {
    let segs = segments(url);
    let rest = match segs.first() {
        Some(&"datasets") | Some(&"spaces") | Some(&"models") => &segs[1..],
        _ => &segs[..],
    };
    if rest.len() < 2 {
        return None;
    }
    Some(format!(
        "huggingface_{}_{}",
        sanitize(rest[0]),
        sanitize(rest[1])
    ))
}
