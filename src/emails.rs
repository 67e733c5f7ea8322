use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// File extensions that look like TLDs in `logo@2x.png`-style asset names.
const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "tif", "tiff", "css", "js", "mp4",
    "webm", "woff", "woff2", "ttf", "eot", "pdf", "zip",
];

static EMAIL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());

static MAILTO: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)mailto:([^"'<>\s?]+)"#).unwrap());

static OBFUSCATED_AT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*[\[\(\{<]\s*at\s*[\]\)\}>]\s*").unwrap());

static OBFUSCATED_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*[\[\(\{<]\s*dot\s*[\]\)\}>]\s*").unwrap());

static LOCAL_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9!#$%&'+/=?^_`{|}~.\-]+$").unwrap());

static DOMAIN_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?$").unwrap());

/// Why a string is not a usable address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxIssue {
    Empty,
    MissingAt,
    MultipleAt,
    EmptyLocalPart,
    MissingDomainLabel,
    DisallowedCharacter,
    Masked,
    TooLong,
    DotPlacement,
    InvalidTopLevel,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyntaxIssue::Empty => "empty address",
            SyntaxIssue::MissingAt => "missing '@'",
            SyntaxIssue::MultipleAt => "multiple '@'",
            SyntaxIssue::EmptyLocalPart => "empty local part",
            SyntaxIssue::MissingDomainLabel => "missing domain label",
            SyntaxIssue::DisallowedCharacter => "disallowed character",
            SyntaxIssue::Masked => "masked address",
            SyntaxIssue::TooLong => "address too long",
            SyntaxIssue::DotPlacement => "misplaced '.'",
            SyntaxIssue::InvalidTopLevel => "invalid top-level domain",
        };
        f.write_str(s)
    }
}

/// Full syntax check of a single address.
pub fn check_syntax(email: &str) -> Result<(), SyntaxIssue> {
    let e = email.trim();
    if e.is_empty() {
        return Err(SyntaxIssue::Empty);
    }
    if e.contains('*') {
        return Err(SyntaxIssue::Masked);
    }
    let at_count = e.matches('@').count();
    if at_count == 0 {
        return Err(SyntaxIssue::MissingAt);
    }
    if at_count > 1 {
        return Err(SyntaxIssue::MultipleAt);
    }
    if e.len() > 254 {
        return Err(SyntaxIssue::TooLong);
    }
    let (local, domain) = e.split_once('@').ok_or(SyntaxIssue::MissingAt)?;
    if local.is_empty() {
        return Err(SyntaxIssue::EmptyLocalPart);
    }
    if local.len() > 64 {
        return Err(SyntaxIssue::TooLong);
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(SyntaxIssue::DotPlacement);
    }
    if !LOCAL_PART.is_match(local) {
        return Err(SyntaxIssue::DisallowedCharacter);
    }

    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() || !domain.contains('.') {
        return Err(SyntaxIssue::MissingDomainLabel);
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.iter().any(|l| l.is_empty()) {
        return Err(SyntaxIssue::MissingDomainLabel);
    }
    if !labels.iter().all(|l| DOMAIN_LABEL.is_match(l)) {
        return Err(SyntaxIssue::DisallowedCharacter);
    }
    let tld = labels.last().copied().unwrap_or_default();
    if tld.len() < 2
        || !tld.chars().all(|c| c.is_ascii_alphabetic())
        || ASSET_EXTENSIONS.contains(&tld.to_ascii_lowercase().as_str())
    {
        return Err(SyntaxIssue::InvalidTopLevel);
    }
    Ok(())
}

/// Lightweight plausibility check (syntax only).
pub fn is_plausible_email(e: &str) -> bool {
    check_syntax(e).is_ok()
}

/// Canonicalization used for deduplication (trimmed, lowercase).
pub fn canonical(s: &str) -> String {
    s.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Split an address into `(local, domain)`; `None` unless exactly one '@'.
pub fn split_email(email: &str) -> Option<(&str, &str)> {
    let (local, domain) = email.trim().split_once('@')?;
    if domain.contains('@') {
        return None;
    }
    Some((local, domain.trim_end_matches('.')))
}

/// Lowercased domain of an address.
pub fn email_domain(email: &str) -> Option<String> {
    split_email(email).map(|(_, d)| d.to_ascii_lowercase())
}

/// Extract email-like tokens from page markup and its visible text.
///
/// Handles plain addresses, `mailto:` links (percent-encoded), numeric and
/// named HTML entities and bracketed `[at]`/`(dot)` obfuscation. Returns
/// unique tokens (case-insensitive) in order of first appearance.
pub fn extract_emails(markup: &str, visible_text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |candidate: &str| {
        let token = candidate.trim().trim_end_matches('.').to_string();
        if token.is_empty() || is_asset_name(&token) {
            return;
        }
        if seen.insert(token.to_ascii_lowercase()) {
            out.push(token);
        }
    };

    let decoded_markup = html_escape::decode_html_entities(markup);

    for cap in MAILTO.captures_iter(&decoded_markup) {
        if let Some(target) = cap.get(1) {
            let raw = target.as_str();
            let decoded = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
            // mailto:a@x.com,b@y.com
            for part in decoded.split([',', ';']) {
                if let Some(m) = EMAIL_TOKEN.find(part) {
                    push(m.as_str());
                }
            }
        }
    }

    for source in [deobfuscate(&decoded_markup), deobfuscate(visible_text)] {
        for m in EMAIL_TOKEN.find_iter(&source) {
            push(m.as_str());
        }
    }

    out
}

fn is_asset_name(token: &str) -> bool {
    token
        .rsplit('.')
        .next()
        .map(|ext| ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn deobfuscate(s: &str) -> String {
    let at = OBFUSCATED_AT.replace_all(s, "@");
    OBFUSCATED_DOT.replace_all(&at, ".").into_owned()
}
