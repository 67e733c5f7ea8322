//! Bounded, same-site crawler that streams email sightings.
//!
//! A crawl starts at the site root (`https://` first, then `http://`) and
//! walks same-site links breadth-first, preferring links that look like
//! careers, contact or about pages. Every budget limit is checked before a
//! fetch is started so the crawl stops cleanly; pages that fail to load are
//! skipped and do not count toward `max_pages`.
//!
//! A page whose final URL (after redirects) leaves the site is skipped the
//! same way. The root may land on another host of the same organization
//! (`acme.com -> www.acme.io`), which then defines the site; a root that
//! lands anywhere else (parking pages, resellers) yields nothing.
//!
//! Results are produced incrementally through [`CrawlStream`], which also
//! exposes live [`CrawlProgress`] counters.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use scraper::{Html, Selector};
use serde::Serialize;
use tokio::time::{Instant, timeout};
use tracing::{debug, info};
use url::Url;

use crate::domain_utils::same_organization;
use crate::emails::extract_emails;
use crate::errors::DiscoveryError;
use crate::fetch::{FetchedPage, PageFetcher};

/// Limits applied to a single site crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlBudget {
    /// Link depth from the root page (root = 0)
    pub max_depth: usize,
    /// Successfully fetched pages
    pub max_pages: usize,
    pub per_page_timeout: Duration,
    /// Wall-clock limit for the whole crawl
    pub total_time_limit: Duration,
}

impl Default for CrawlBudget {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 15,
            per_page_timeout: Duration::from_secs(5),
            total_time_limit: Duration::from_secs(60),
        }
    }
}

impl CrawlBudget {
    /// Cap on fetch attempts, failed ones included.
    pub fn max_visits(&self) -> usize {
        self.max_pages.saturating_mul(3).max(1)
    }

    /// Same budget with a tighter wall-clock limit.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.total_time_limit = self.total_time_limit.min(limit);
        self
    }
}

/// Kind of page an address was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageContext {
    Careers,
    Contact,
    About,
    Generic,
}

const CAREERS_KEYWORDS: &[&str] = &[
    "career",
    "jobs",
    "job opening",
    "join us",
    "joinus",
    "join our team",
    "hiring",
    "work with us",
    "vacanc",
    "open positions",
    "openings",
    "recruit",
];
const CONTACT_KEYWORDS: &[&str] = &["contact", "get in touch", "reach us", "reach out"];
const ABOUT_KEYWORDS: &[&str] = &["about", "who we are", "our story", "our team"];
/// Too common in titles and prose; only count as a whole path segment.
const ABOUT_PATH_SEGMENTS: &[&str] = &["company", "team", "leadership"];

impl PageContext {
    /// Ranking used to keep the best context for duplicate addresses and to
    /// order the crawl frontier.
    pub fn priority(self) -> u8 {
        match self {
            PageContext::Careers => 3,
            PageContext::Contact => 2,
            PageContext::About => 1,
            PageContext::Generic => 0,
        }
    }

    /// Classify from URL path first, then title, then headings.
    pub fn classify(url: &Url, title: Option<&str>, headings: &[String]) -> PageContext {
        let from_path = Self::from_path(url.path());
        if from_path != PageContext::Generic {
            return from_path;
        }
        if let Some(title) = title {
            let from_title = Self::from_text(title);
            if from_title != PageContext::Generic {
                return from_title;
            }
        }
        headings
            .iter()
            .map(|h| Self::from_text(h))
            .find(|c| *c != PageContext::Generic)
            .unwrap_or(PageContext::Generic)
    }

    /// Keyword match over free text or a URL path (`/join-us` reads as "join us").
    pub fn from_text(text: &str) -> PageContext {
        let normalized: String = text
            .chars()
            .map(|c| match c {
                '-' | '_' | '/' | '.' => ' ',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        let hit = |keywords: &[&str]| keywords.iter().any(|k| normalized.contains(k));
        if hit(CAREERS_KEYWORDS) {
            PageContext::Careers
        } else if hit(CONTACT_KEYWORDS) {
            PageContext::Contact
        } else if hit(ABOUT_KEYWORDS) {
            PageContext::About
        } else {
            PageContext::Generic
        }
    }

    /// [`from_text`](Self::from_text) plus segment-only keywords
    /// (`/company`, `/about/team`).
    pub fn from_path(path: &str) -> PageContext {
        match Self::from_text(path) {
            PageContext::Generic => {
                let about = path.split('/').any(|segment| {
                    ABOUT_PATH_SEGMENTS.contains(&segment.to_ascii_lowercase().as_str())
                });
                if about {
                    PageContext::About
                } else {
                    PageContext::Generic
                }
            }
            context => context,
        }
    }
}

impl fmt::Display for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageContext::Careers => "CAREERS",
            PageContext::Contact => "CONTACT",
            PageContext::About => "ABOUT",
            PageContext::Generic => "GENERIC",
        };
        f.write_str(s)
    }
}

/// An address as seen on a crawled page, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawEmailSighting {
    pub email: String,
    pub found_on_domain: String,
    pub page_context: PageContext,
    pub page_url: String,
}

/// Why a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing left to visit
    Exhausted,
    MaxPages,
    VisitLimit,
    TimeLimit,
}

/// Live counters for a running crawl.
#[derive(Debug, Default)]
pub struct CrawlProgress {
    pages_fetched: AtomicUsize,
    pages_failed: AtomicUsize,
    urls_visited: AtomicUsize,
    emails_found: AtomicUsize,
    stop_reason: Mutex<Option<StopReason>>,
}

/// Point-in-time copy of [`CrawlProgress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlProgressSnapshot {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub urls_visited: usize,
    pub emails_found: usize,
    pub stop_reason: Option<StopReason>,
}

impl CrawlProgress {
    pub fn snapshot(&self) -> CrawlProgressSnapshot {
        CrawlProgressSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            urls_visited: self.urls_visited.load(Ordering::Relaxed),
            emails_found: self.emails_found.load(Ordering::Relaxed),
            stop_reason: *self.stop_reason.lock(),
        }
    }

    fn finish(&self, reason: StopReason) {
        self.stop_reason.lock().get_or_insert(reason);
    }
}

/// Stream of sightings from one crawl.
///
/// Dropping the stream cancels the crawl.
pub struct CrawlStream {
    inner: Pin<Box<dyn Stream<Item = RawEmailSighting> + Send>>,
    progress: Arc<CrawlProgress>,
}

impl CrawlStream {
    pub fn progress(&self) -> Arc<CrawlProgress> {
        Arc::clone(&self.progress)
    }
}

impl Stream for CrawlStream {
    type Item = RawEmailSighting;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

/// Site crawler over a [`PageFetcher`].
#[derive(Clone)]
pub struct SiteCrawler {
    fetcher: Arc<dyn PageFetcher>,
}

impl SiteCrawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Crawl a bare domain, trying `https://domain/` then `http://domain/`.
    pub fn crawl(&self, domain: &str, budget: CrawlBudget) -> CrawlStream {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        let roots = ["https", "http"]
            .iter()
            .filter_map(|scheme| Url::parse(&format!("{scheme}://{domain}/")).ok())
            .collect();
        self.run(domain, roots, budget)
    }

    /// Crawl starting from an explicit URL.
    pub fn crawl_url(&self, start: Url, budget: CrawlBudget) -> CrawlStream {
        let domain = start.host_str().unwrap_or_default().to_ascii_lowercase();
        self.run(domain, vec![start], budget)
    }

    fn run(&self, domain: String, roots: Vec<Url>, budget: CrawlBudget) -> CrawlStream {
        let progress = Arc::new(CrawlProgress::default());
        let fetcher = Arc::clone(&self.fetcher);
        let state_progress = Arc::clone(&progress);

        let inner = async_stream::stream! {
            let mut state = CrawlState::new(domain, budget, state_progress);
            let mut roots: VecDeque<Url> = roots.into();

            loop {
                let next = if state.site.is_some() {
                    state.frontier.pop()
                } else {
                    roots.pop_front().map(QueuedUrl::root)
                };
                let Some(item) = next else {
                    state.progress.finish(StopReason::Exhausted);
                    break;
                };
                if let Some(reason) = state.limit_reached() {
                    state.progress.finish(reason);
                    break;
                }

                state.visits += 1;
                state.progress.urls_visited.fetch_add(1, Ordering::Relaxed);
                let wait = budget.per_page_timeout.min(state.remaining());
                let result = match timeout(wait, fetcher.fetch(&item.url, wait)).await {
                    Ok(result) => result,
                    Err(_) => Err(DiscoveryError::page_timeout(
                        item.url.as_str(),
                        wait.as_millis() as u64,
                    )),
                };

                match result {
                    Ok(page) if !state.accepts(&item, &page) => {
                        state.progress.pages_failed.fetch_add(1, Ordering::Relaxed);
                        debug!(url = %item.url, landed = %page.url, "redirected off-site, skipping page");
                    }
                    Ok(page) => {
                        for sighting in state.absorb(&item, page) {
                            yield sighting;
                        }
                    }
                    Err(e) => {
                        state.progress.pages_failed.fetch_add(1, Ordering::Relaxed);
                        debug!(url = %item.url, category = %e.category(), error = %e, "skipping page");
                    }
                }
            }

            let snapshot = state.progress.snapshot();
            info!(
                domain = %state.domain,
                pages = snapshot.pages_fetched,
                failed = snapshot.pages_failed,
                emails = snapshot.emails_found,
                stop = ?snapshot.stop_reason,
                elapsed_ms = state.started.elapsed().as_millis() as u64,
                "crawl finished"
            );
        };

        CrawlStream {
            inner: Box::pin(inner),
            progress,
        }
    }
}

/// Frontier entry. Ordered so the max-heap pops the most promising link:
/// higher rank, then shallower, then discovered earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedUrl {
    url: Url,
    depth: usize,
    rank: u8,
    seq: u64,
}

impl QueuedUrl {
    fn root(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            rank: u8::MAX,
            seq: 0,
        }
    }
}

impl Ord for QueuedUrl {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedUrl {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Host (without `www.`) and port that define "same site".
#[derive(Debug, Clone, PartialEq, Eq)]
struct SiteKey {
    host: String,
    port: Option<u16>,
}

impl SiteKey {
    fn of(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        Some(Self {
            host,
            port: url.port_or_known_default(),
        })
    }

    fn contains(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(other) = SiteKey::of(url) else {
            return false;
        };
        let default_port = |p: Option<u16>| matches!(p, Some(80) | Some(443));
        other.host == self.host
            && (other.port == self.port || (default_port(other.port) && default_port(self.port)))
    }
}

struct CrawlState {
    domain: String,
    budget: CrawlBudget,
    progress: Arc<CrawlProgress>,
    started: Instant,
    site: Option<SiteKey>,
    frontier: BinaryHeap<QueuedUrl>,
    seen: HashSet<String>,
    visits: usize,
    pages: usize,
    seq: u64,
}

impl CrawlState {
    fn new(domain: String, budget: CrawlBudget, progress: Arc<CrawlProgress>) -> Self {
        Self {
            domain,
            budget,
            progress,
            started: Instant::now(),
            site: None,
            frontier: BinaryHeap::new(),
            seen: HashSet::new(),
            visits: 0,
            pages: 0,
            seq: 0,
        }
    }

    fn remaining(&self) -> Duration {
        self.budget
            .total_time_limit
            .saturating_sub(self.started.elapsed())
    }

    fn limit_reached(&self) -> Option<StopReason> {
        if self.remaining().is_zero() {
            Some(StopReason::TimeLimit)
        } else if self.pages >= self.budget.max_pages {
            Some(StopReason::MaxPages)
        } else if self.visits >= self.budget.max_visits() {
            Some(StopReason::VisitLimit)
        } else {
            None
        }
    }

    /// Whether a fetched page still belongs to the crawl. Before the site is
    /// known, the landing host must belong to the requested organization.
    fn accepts(&self, item: &QueuedUrl, page: &FetchedPage) -> bool {
        match &self.site {
            Some(site) => site.contains(&page.url),
            None => match (item.url.host_str(), page.url.host_str()) {
                (Some(requested), Some(landed)) => same_organization(requested, landed),
                _ => false,
            },
        }
    }

    /// Record a fetched page: queue its links and return its sightings.
    fn absorb(&mut self, item: &QueuedUrl, page: FetchedPage) -> Vec<RawEmailSighting> {
        if self.site.is_none() {
            self.site = SiteKey::of(&page.url).or_else(|| SiteKey::of(&item.url));
            self.seen.insert(url_key(&item.url));
        }
        self.seen.insert(url_key(&page.url));
        self.pages += 1;
        self.progress.pages_fetched.fetch_add(1, Ordering::Relaxed);

        let parsed = parse_page(&page.url, &page.body);
        let context = PageContext::classify(&page.url, parsed.title.as_deref(), &parsed.headings);
        debug!(url = %page.url, depth = item.depth, context = %context, links = parsed.links.len(), "page parsed");

        if item.depth < self.budget.max_depth {
            for (link, anchor) in parsed.links {
                let in_site = self.site.as_ref().is_some_and(|s| s.contains(&link));
                if !in_site || !is_crawlable(&link) || !self.seen.insert(url_key(&link)) {
                    continue;
                }
                self.seq += 1;
                let rank = PageContext::from_path(link.path())
                    .priority()
                    .max(PageContext::from_text(&anchor).priority());
                self.frontier.push(QueuedUrl {
                    url: link,
                    depth: item.depth + 1,
                    rank,
                    seq: self.seq,
                });
            }
        }

        self.progress
            .emails_found
            .fetch_add(parsed.emails.len(), Ordering::Relaxed);
        parsed
            .emails
            .into_iter()
            .map(|email| RawEmailSighting {
                email,
                found_on_domain: self.domain.clone(),
                page_context: context,
                page_url: page.url.to_string(),
            })
            .collect()
    }
}

/// Owned parse result; `scraper::Html` never outlives [`parse_page`].
#[derive(Debug, Default)]
struct ParsedPage {
    title: Option<String>,
    headings: Vec<String>,
    links: Vec<(Url, String)>,
    emails: Vec<String>,
}

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static HEADINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2").expect("valid selector"));
static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

fn parse_page(base: &Url, body: &str) -> ParsedPage {
    let doc = Html::parse_document(body);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|t| collapse_ws(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());
    let headings = doc
        .select(&HEADINGS)
        .map(|h| collapse_ws(&h.text().collect::<Vec<_>>().join(" ")))
        .filter(|h| !h.is_empty())
        .collect();

    let mut links = Vec::new();
    for a in doc.select(&LINKS) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        if let Ok(mut link) = base.join(href) {
            link.set_fragment(None);
            if matches!(link.scheme(), "http" | "https") {
                let anchor = collapse_ws(&a.text().collect::<Vec<_>>().join(" "));
                links.push((link, anchor));
            }
        }
    }

    let text = visible_text(&doc);
    let emails = extract_emails(body, &text);

    ParsedPage {
        title,
        headings,
        links,
        emails,
    }
}

fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|el| el.name().to_string()))
            .is_some_and(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn url_key(url: &Url) -> String {
    let mut u = url.clone();
    u.set_fragment(None);
    let s = u.to_string();
    match s.strip_suffix('/') {
        Some(stripped) if u.path() != "/" => stripped.to_string(),
        _ => s,
    }
}

const SKIP_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "css", "js", "json", "xml", "pdf",
    "zip", "gz", "tar", "rar", "mp3", "mp4", "webm", "mov", "avi", "woff", "woff2", "ttf", "eot",
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "exe", "dmg",
];

fn is_crawlable(url: &Url) -> bool {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) => !SKIP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}
