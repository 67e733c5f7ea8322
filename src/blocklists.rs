//! Curated domain and local-part block lists.
//!
//! All sets are immutable once built. The built-in lists are created once per
//! process (see [`BlockLists::shared`]); additional entries are plain data
//! passed through [`BlockListsBuilder`], never new code paths.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

pub(crate) const JOB_PLATFORMS: &[&str] = &[
    "freelancer.com",
    "upwork.com",
    "fiverr.com",
    "guru.com",
    "peopleperhour.com",
    "toptal.com",
    "remoteok.com",
    "remoteok.io",
    "99designs.com",
    "indeed.com",
    "linkedin.com",
    "glassdoor.com",
    "monster.com",
    "careerbuilder.com",
    "ziprecruiter.com",
    "simplyhired.com",
    "wellfound.com",
    "angel.co",
    "naukri.com",
    "workable.com",
    "lever.co",
    "greenhouse.io",
    "weworkremotely.com",
    "dice.com",
];

pub(crate) const DISPOSABLE: &[&str] = &[
    "tempmail.com",
    "10minutemail.com",
    "guerrillamail.com",
    "mailinator.com",
    "throwaway.email",
    "temp-mail.org",
    "yopmail.com",
    "trashmail.com",
    "getnada.com",
    "sharklasers.com",
    "dispostable.com",
    "maildrop.cc",
];

pub(crate) const SOCIAL: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "youtube.com",
    "pinterest.com",
    "reddit.com",
    "medium.com",
    "threads.net",
];

/// Domains that show up in markup (analytics DSNs, site builders, docs
/// samples) but never belong to a hiring company.
pub(crate) const PLACEHOLDER: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "test.com",
    "email.com",
    "domain.com",
    "yourdomain.com",
    "sentry.io",
    "sentry-next.wixpress.com",
    "wixpress.com",
    "wix.com",
    "weebly.com",
    "squarespace.com",
    "godaddy.com",
];

const FREE_MAIL: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "icloud.com",
    "mail.com",
    "gmx.com",
    "zoho.com",
    "yandex.com",
];

const PRIORITY_PREFIXES: &[&str] = &[
    "careers",
    "career",
    "jobs",
    "job",
    "hr",
    "recruiting",
    "recruitment",
    "recruiter",
    "talent",
    "hiring",
    "info",
    "contact",
];

pub(crate) const NEGATIVE_PREFIXES: &[&str] = &[
    "noreply",
    "no-reply",
    "no_reply",
    "donotreply",
    "do-not-reply",
    "mailer-daemon",
    "postmaster",
    "webmaster",
    "hostmaster",
    "support",
    "abuse",
    "spam",
    "privacy",
    "unsubscribe",
    "bounce",
];

/// Company-name fragments that indicate the "company" is a platform
/// placeholder rather than a real employer.
const PLATFORM_NAME_MARKERS: &[&str] = &[
    "client",
    "freelancer.com",
    "upwork",
    "guru",
    "fiverr",
    "confidential",
    "anonymous",
];

static BUILTIN: Lazy<Arc<BlockLists>> = Lazy::new(|| Arc::new(BlockLists::builder().build()));

/// Which list a blocked address matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCategory {
    JobPlatform,
    Disposable,
    Social,
    Placeholder,
    NegativePrefix,
}

impl BlockCategory {
    pub fn label(self) -> &'static str {
        match self {
            BlockCategory::JobPlatform => "job platform domain",
            BlockCategory::Disposable => "disposable email domain",
            BlockCategory::Social => "social media domain",
            BlockCategory::Placeholder => "placeholder domain",
            BlockCategory::NegativePrefix => "non-personal mailbox prefix",
        }
    }
}

/// A block-list hit: category plus the list entry that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMatch {
    pub category: BlockCategory,
    pub entry: String,
}

impl fmt::Display for BlockMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category.label(), self.entry)
    }
}

/// Immutable block-list sets.
#[derive(Debug, Clone)]
pub struct BlockLists {
    job_platforms: HashSet<String>,
    disposable: HashSet<String>,
    social: HashSet<String>,
    placeholder: HashSet<String>,
    free_mail: HashSet<String>,
    priority_prefixes: HashSet<String>,
    negative_prefixes: HashSet<String>,
}

impl Default for BlockLists {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BlockLists {
    /// Process-wide built-in lists.
    pub fn shared() -> Arc<BlockLists> {
        Arc::clone(&BUILTIN)
    }

    /// Start from the built-in lists.
    pub fn builder() -> BlockListsBuilder {
        BlockListsBuilder::default()
    }

    /// Check a domain against the job-platform, disposable, social and
    /// placeholder lists (label-boundary suffix match).
    pub fn match_domain(&self, domain: &str) -> Option<BlockMatch> {
        let domain = normalize_domain(domain);
        let lists = [
            (BlockCategory::JobPlatform, &self.job_platforms),
            (BlockCategory::Disposable, &self.disposable),
            (BlockCategory::Social, &self.social),
            (BlockCategory::Placeholder, &self.placeholder),
        ];
        for (category, set) in lists {
            if let Some(entry) = suffix_match(&domain, set) {
                return Some(BlockMatch {
                    category,
                    entry: entry.to_string(),
                });
            }
        }
        None
    }

    /// Check a local part against the negative-prefix list.
    ///
    /// Matches the whole local part or a prefix followed by a separator
    /// (`noreply`, `noreply.billing`, `support-team`).
    pub fn match_local_part(&self, local: &str) -> Option<BlockMatch> {
        let local = local.trim().to_ascii_lowercase();
        self.negative_prefixes
            .iter()
            .filter(|p| prefix_matches(&local, p))
            // Longest entry wins so reasons are specific and deterministic.
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .map(|p| BlockMatch {
                category: BlockCategory::NegativePrefix,
                entry: p.clone(),
            })
    }

    pub fn is_free_mail(&self, domain: &str) -> bool {
        suffix_match(&normalize_domain(domain), &self.free_mail).is_some()
    }

    /// Whether a local part starts with a priority prefix (careers, jobs, ...).
    pub fn priority_prefix(&self, local: &str) -> Option<&str> {
        let local = local.trim().to_ascii_lowercase();
        self.priority_prefixes
            .iter()
            .filter(|p| prefix_matches(&local, p))
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .map(String::as_str)
    }

    /// Company names that are platform placeholders ("Freelancer.com Client").
    pub fn company_looks_like_platform(&self, company_name: &str) -> bool {
        let lower = company_name.to_ascii_lowercase();
        PLATFORM_NAME_MARKERS.iter().any(|m| lower.contains(m))
            || self
                .job_platforms
                .iter()
                .any(|d| lower.split_whitespace().any(|w| w == d))
    }
}

/// Builder extending the built-in lists with extra data.
#[derive(Debug, Clone)]
pub struct BlockListsBuilder {
    lists: BlockLists,
}

impl Default for BlockListsBuilder {
    fn default() -> Self {
        Self {
            lists: BlockLists {
                job_platforms: to_set(JOB_PLATFORMS),
                disposable: to_set(DISPOSABLE),
                social: to_set(SOCIAL),
                placeholder: to_set(PLACEHOLDER),
                free_mail: to_set(FREE_MAIL),
                priority_prefixes: to_set(PRIORITY_PREFIXES),
                negative_prefixes: to_set(NEGATIVE_PREFIXES),
            },
        }
    }
}

impl BlockListsBuilder {
    pub fn job_platforms<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend(&mut self.lists.job_platforms, domains);
        self
    }

    pub fn disposable<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend(&mut self.lists.disposable, domains);
        self
    }

    pub fn social<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend(&mut self.lists.social, domains);
        self
    }

    pub fn free_mail<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend(&mut self.lists.free_mail, domains);
        self
    }

    pub fn negative_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend(&mut self.lists.negative_prefixes, prefixes);
        self
    }

    pub fn build(self) -> BlockLists {
        self.lists
    }
}

fn to_set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn extend<I, S>(set: &mut HashSet<String>, items: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    set.extend(
        items
            .into_iter()
            .map(|s| normalize_domain(s.as_ref()))
            .filter(|s| !s.is_empty()),
    );
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// `domain` equals an entry or ends with `.<entry>`.
fn suffix_match<'a>(domain: &str, set: &'a HashSet<String>) -> Option<&'a str> {
    if let Some(hit) = set.get(domain) {
        return Some(hit.as_str());
    }
    let mut rest = domain;
    while let Some(idx) = rest.find('.') {
        rest = &rest[idx + 1..];
        if let Some(hit) = set.get(rest) {
            return Some(hit.as_str());
        }
    }
    None
}

fn prefix_matches(local: &str, prefix: &str) -> bool {
    match local.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with(['.', '-', '_', '+']) || rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}
