//! URL normalization.
//!
//! [`clean_url`] turns whatever an operator pasted into a canonical URL:
//!
//! 1. A leading invocation marker (`!wget https://…`) is dropped, as is
//!    anything after the first whitespace.
//! 2. `https://` is prefixed when no scheme is present.
//! 3. Query parameters are filtered. Hosts with a functional allowlist keep
//!    only those parameters; every other host loses known tracking
//!    parameters. Names are compared case-insensitively.
//! 4. A trailing `/` is trimmed when there is no query or fragment.
//!
//! `clean_url(clean_url(u)) == clean_url(u)` for every input.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Prefix of the reader proxy that renders arbitrary pages (and PDFs) as
/// markdown for the extraction stage.
pub const READER_PROXY: &str = "https://r.jina.ai/";

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());

const TRACKING_PREFIXES: &[&str] = &["utm_", "pk_", "mtm_"];

const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "dclid",
    "gbraid",
    "wbraid",
    "msclkid",
    "yclid",
    "igshid",
    "twclid",
    "ttclid",
    "ref",
    "ref_src",
    "ref_url",
    "referrer",
    "mc_cid",
    "mc_eid",
    "_hsenc",
    "_hsmi",
    "mkt_tok",
    "_ga",
    "_gl",
    "spm",
    "si",
    "aff",
    "aff_id",
    "affiliate",
    "affiliate_id",
    "cmpid",
    "oly_enc_id",
    "oly_anon_id",
    "vero_id",
    "wickedid",
];

struct Allowlist {
    domain: &'static str,
    params: &'static [&'static str],
}

const ALLOWLISTS: &[Allowlist] = &[
    Allowlist {
        domain: "youtube.com",
        params: &["v", "t", "list", "index"],
    },
    Allowlist {
        domain: "youtu.be",
        params: &["t"],
    },
    Allowlist {
        domain: "github.com",
        params: &["tab", "q", "type"],
    },
    Allowlist {
        domain: "arxiv.org",
        params: &["v"],
    },
];

/// True if `host` is `domain` or one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TRACKING_PREFIXES.iter().any(|p| lower.starts_with(p))
        || TRACKING_PARAMS.contains(&lower.as_str())
}

/// The URL token of the input. After a `!command` marker, option flags are
/// skipped and the first token with a scheme wins over bare arguments.
fn strip_invocation(raw: &str) -> &str {
    let mut tokens = raw.split_whitespace().peekable();
    if !tokens.peek().is_some_and(|t| t.starts_with('!')) {
        return tokens.next().unwrap_or("");
    }
    let args: Vec<&str> = tokens.skip(1).filter(|t| !t.starts_with('-')).collect();
    args.iter()
        .find(|t| t.contains("://"))
        .or(args.first())
        .copied()
        .unwrap_or("")
}

fn filter_query(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let allowlist = url
        .host_str()
        .and_then(|h| ALLOWLISTS.iter().find(|a| host_matches(h, a.domain)))
        .map(|a| a.params);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(name, _)| match allowlist {
            Some(params) => params.contains(&name.to_ascii_lowercase().as_str()),
            None => !is_tracking_param(name),
        })
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else if kept.len() != pairs.len() {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}

/// Normalize a URL for storage and classification.
pub fn clean_url(raw: &str) -> String {
    let candidate = strip_invocation(raw);
    if candidate.is_empty() {
        return String::new();
    }

    let prefixed = if SCHEME.is_match(candidate) {
        candidate.to_string()
    } else {
        format!("https://{}", candidate)
    };

    let mut parsed = match Url::parse(&prefixed) {
        Ok(u) => u,
        Err(_) => return prefixed,
    };
    filter_query(&mut parsed);

    let bare = parsed.query().is_none() && parsed.fragment().is_none();
    let mut out: String = parsed.into();
    if bare {
        while out.ends_with('/') && !out.ends_with("://") {
            out.pop();
        }
    }
    out
}

/// Route a URL through the reader proxy.
pub fn reader_proxy_url(url: &str) -> String {
    format!("{}{}", READER_PROXY, url)
}

/// PDFs cannot be extracted directly and always go through the reader proxy.
pub fn needs_reader_proxy(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or_else(|_| url.to_ascii_lowercase().ends_with(".pdf"))
}
