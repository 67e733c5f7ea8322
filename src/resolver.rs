//! Candidate domain resolution for a company.
//!
//! Strategies run in a fixed order and each appends only domains not yet
//! seen:
//!   1. URL-derived (job domain hint, then the posting's source URL)
//!   2. Pattern guesses from the normalized company name
//!   3. One web search for the company's official website
//!
//! Addresses that already appear in search result titles or snippets are
//! handed back alongside the domains so they can be scored without a crawl.
//!
//! Every strategy is advisory. Failures are logged and the next strategy
//! runs; an empty result is not an error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::blocklists::BlockLists;
use crate::crawler::{PageContext, RawEmailSighting};
use crate::domain_utils::{
    core_company_name, extract_domain_from_url, extract_registrable_domain, normalize_company_name,
};
use crate::emails::{email_domain, extract_emails};
use crate::errors::{DiscoveryError, Result};
use crate::search::{SearchHit, WebSearch, search_within};

/// Suffixes tried, in order, for pattern guesses.
pub const GUESS_TLDS: &[&str] = &["com", "io", "co", "in", "ai"];

const MIN_GUESS_LEN: usize = 3;

/// One company to discover contacts for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CompanyQuery {
    pub company_name: String,
    pub job_domain_hint: Option<String>,
    pub source_url: Option<String>,
}

impl CompanyQuery {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            ..Self::default()
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_job_domain_hint(mut self, domain: impl Into<String>) -> Self {
        self.job_domain_hint = Some(domain.into());
        self
    }

    /// Reject queries with neither a company name nor a source URL.
    pub fn validate(&self) -> Result<()> {
        let has_name = !self.company_name.trim().is_empty();
        let has_url = self
            .source_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if has_name || has_url {
            Ok(())
        } else {
            Err(DiscoveryError::invalid_query(
                "company name is empty and no source URL was given",
            ))
        }
    }
}

impl fmt::Display for CompanyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.company_name, &self.source_url) {
            (name, _) if !name.trim().is_empty() => f.write_str(name.trim()),
            (_, Some(url)) => f.write_str(url),
            _ => f.write_str("<empty query>"),
        }
    }
}

/// How a candidate domain was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainOrigin {
    UrlDerived,
    PatternGuess,
    SearchDerived,
}

/// A domain worth crawling; `priority` 0 is tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateDomain {
    pub domain: String,
    pub origin: DomainOrigin,
    pub priority: usize,
}

/// Everything resolution produced for one company.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub domains: Vec<CandidateDomain>,
    /// Addresses quoted in search result titles/snippets
    pub search_sightings: Vec<RawEmailSighting>,
}

pub struct DomainResolver {
    blocklists: Arc<BlockLists>,
    search: Arc<dyn WebSearch>,
    search_timeout: Duration,
}

impl DomainResolver {
    pub fn new(
        blocklists: Arc<BlockLists>,
        search: Arc<dyn WebSearch>,
        search_timeout: Duration,
    ) -> Self {
        Self {
            blocklists,
            search,
            search_timeout,
        }
    }

    /// Ordered, duplicate-free candidate domains for `query`. The search
    /// step is skipped once `deadline` has passed.
    pub async fn resolve(&self, query: &CompanyQuery, deadline: Instant) -> Vec<CandidateDomain> {
        self.resolve_detailed(query, deadline).await.domains
    }

    /// Like [`resolve`](Self::resolve), also returning addresses seen in
    /// search results.
    pub async fn resolve_detailed(&self, query: &CompanyQuery, deadline: Instant) -> Resolution {
        let mut out = Candidates::default();
        let mut search_sightings = Vec::new();

        for domain in self.url_derived(query) {
            out.push(domain, DomainOrigin::UrlDerived);
        }
        for domain in self.pattern_guesses(&query.company_name) {
            out.push(domain, DomainOrigin::PatternGuess);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(company = %query, "deadline reached, skipping search");
        } else {
            let hits = self
                .search_hits(&query.company_name, self.search_timeout.min(remaining))
                .await;
            if let Some(domain) = hits.iter().find_map(|hit| self.official_domain(hit)) {
                out.push(domain, DomainOrigin::SearchDerived);
            }
            search_sightings = hits.iter().flat_map(sightings_in_hit).collect();
        }

        let domains = out.into_vec();
        info!(
            company = %query,
            candidates = domains.len(),
            first = domains.first().map(|c| c.domain.as_str()).unwrap_or("-"),
            search_emails = search_sightings.len(),
            "domains resolved"
        );
        Resolution {
            domains,
            search_sightings,
        }
    }

    /// Hint first, then the source URL, skipping block-listed domains.
    pub fn url_derived(&self, query: &CompanyQuery) -> Vec<String> {
        [query.job_domain_hint.as_deref(), query.source_url.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(|raw| {
                let host = extract_domain_from_url(raw).ok()?;
                let domain = extract_registrable_domain(&host).unwrap_or(host);
                match self.blocklists.match_domain(&domain) {
                    Some(hit) => {
                        debug!(domain = %domain, reason = %hit, "skipping URL-derived domain");
                        None
                    }
                    None => Some(domain),
                }
            })
            .collect()
    }

    /// `<name>.<tld>` guesses from the legal-suffix-free name, then the fully
    /// normalized name when it differs.
    pub fn pattern_guesses(&self, company_name: &str) -> Vec<String> {
        if company_name.trim().is_empty() || self.blocklists.company_looks_like_platform(company_name)
        {
            return Vec::new();
        }
        let core = core_company_name(company_name);
        let full = normalize_company_name(company_name);
        let mut stems = vec![core];
        if !stems.contains(&full) {
            stems.push(full);
        }
        stems
            .into_iter()
            .filter(|stem| stem.len() >= MIN_GUESS_LEN)
            .flat_map(|stem| GUESS_TLDS.iter().map(move |tld| format!("{stem}.{tld}")))
            .collect()
    }

    async fn search_hits(&self, company_name: &str, limit: Duration) -> Vec<SearchHit> {
        let name = company_name.trim();
        if name.is_empty() {
            return Vec::new();
        }
        let query = format!("\"{name}\" official website");
        match search_within(self.search.as_ref(), &query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    backend = self.search.name(),
                    query = %query,
                    category = %e.category(),
                    error = %e,
                    "search failed"
                );
                Vec::new()
            }
        }
    }

    /// Registrable domain of a hit unless it is a platform, social or
    /// free-mail site.
    fn official_domain(&self, hit: &SearchHit) -> Option<String> {
        let domain = hit_domain(&hit.url)?;
        let rejected =
            self.blocklists.match_domain(&domain).is_some() || self.blocklists.is_free_mail(&domain);
        (!rejected).then_some(domain)
    }
}

fn hit_domain(url: &str) -> Option<String> {
    let host = extract_domain_from_url(url).ok()?;
    Some(extract_registrable_domain(&host).unwrap_or(host))
}

/// Addresses quoted in a result's title or snippet, attributed to the
/// result page.
fn sightings_in_hit(hit: &SearchHit) -> Vec<RawEmailSighting> {
    let text = format!("{} {}", hit.title, hit.snippet);
    let page_domain = hit_domain(&hit.url);
    extract_emails("", &text)
        .into_iter()
        .filter_map(|email| {
            let found_on_domain = page_domain.clone().or_else(|| email_domain(&email))?;
            Some(RawEmailSighting {
                email,
                found_on_domain,
                page_context: PageContext::Generic,
                page_url: hit.url.clone(),
            })
        })
        .collect()
}

#[derive(Default)]
struct Candidates {
    items: Vec<CandidateDomain>,
}

impl Candidates {
    fn push(&mut self, domain: String, origin: DomainOrigin) {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() || self.items.iter().any(|c| c.domain == domain) {
            return;
        }
        let priority = self.items.len();
        self.items.push(CandidateDomain {
            domain,
            origin,
            priority,
        });
    }

    fn into_vec(self) -> Vec<CandidateDomain> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchHit;
    use async_trait::async_trait;

    struct FixedSearch(Vec<&'static str>);

    #[async_trait]
    impl WebSearch for FixedSearch {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
            Ok(self
                .0
                .iter()
                .map(|u| SearchHit {
                    url: u.to_string(),
                    title: String::new(),
                    snippet: String::new(),
                })
                .collect())
        }
    }

    struct QuotedSearch;

    #[async_trait]
    impl WebSearch for QuotedSearch {
        fn name(&self) -> &'static str {
            "quoted"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
            Ok(vec![
                SearchHit {
                    url: "https://www.crunchbase.org/organization/initech".to_string(),
                    title: "Initech - contact: press@initech.com".to_string(),
                    snippet: "Hiring? Write to talent [at] initech [dot] com today.".to_string(),
                },
                SearchHit {
                    url: "not a url".to_string(),
                    title: String::new(),
                    snippet: "jobs@initech.io".to_string(),
                },
            ])
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl WebSearch for BrokenSearch {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
            Err(DiscoveryError::search(query, "service unavailable"))
        }
    }

    fn resolver(search: impl WebSearch + 'static) -> DomainResolver {
        DomainResolver::new(BlockLists::shared(), Arc::new(search), Duration::from_secs(1))
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn strategies_run_in_order_without_duplicates() {
        let r = resolver(FixedSearch(vec![
            "https://www.linkedin.com/company/acme",
            "https://acmecorp.io/about",
        ]));
        let query = CompanyQuery::new("Acme").with_source_url("https://jobs.acme.com/openings/1");
        let got = r.resolve(&query, deadline()).await;

        let domains: Vec<&str> = got.iter().map(|c| c.domain.as_str()).collect();
        assert_eq!(
            domains,
            vec!["acme.com", "acme.io", "acme.co", "acme.in", "acme.ai", "acmecorp.io"]
        );
        assert_eq!(got[0].origin, DomainOrigin::UrlDerived);
        assert_eq!(got[1].origin, DomainOrigin::PatternGuess);
        assert_eq!(got[5].origin, DomainOrigin::SearchDerived);
        assert!(got.iter().enumerate().all(|(i, c)| c.priority == i));
    }

    #[tokio::test]
    async fn job_platform_urls_are_skipped() {
        let r = resolver(FixedSearch(vec![]));
        let query = CompanyQuery::new("Zz").with_source_url("https://www.linkedin.com/jobs/view/1");
        assert!(r.resolve(&query, deadline()).await.is_empty());
    }

    #[tokio::test]
    async fn search_failures_are_swallowed() {
        let r = resolver(BrokenSearch);
        let got = r.resolve(&CompanyQuery::new("Globex"), deadline()).await;
        assert_eq!(got.len(), GUESS_TLDS.len());
        assert!(got.iter().all(|c| c.origin == DomainOrigin::PatternGuess));
    }

    #[tokio::test]
    async fn search_titles_and_snippets_yield_sightings() {
        let r = resolver(QuotedSearch);
        let got = r.resolve_detailed(&CompanyQuery::new("Initech"), deadline()).await;

        let emails: Vec<&str> = got.search_sightings.iter().map(|s| s.email.as_str()).collect();
        assert_eq!(emails, vec!["press@initech.com", "talent@initech.com", "jobs@initech.io"]);

        let first = &got.search_sightings[0];
        assert_eq!(first.page_context, PageContext::Generic);
        assert_eq!(first.page_url, "https://www.crunchbase.org/organization/initech");
        assert_eq!(first.found_on_domain, "crunchbase.org");
        assert_eq!(got.search_sightings[2].found_on_domain, "initech.io");

        assert!(got.domains.iter().any(|c| c.domain == "crunchbase.org"));
    }

    #[tokio::test]
    async fn skipped_search_yields_no_sightings() {
        let r = resolver(QuotedSearch);
        let got = r.resolve_detailed(&CompanyQuery::new("Initech"), Instant::now()).await;
        assert!(got.search_sightings.is_empty());
        assert!(got.domains.iter().all(|c| c.origin == DomainOrigin::PatternGuess));
    }

    #[test]
    fn guesses_strip_legal_suffixes_first() {
        let r = resolver(FixedSearch(vec![]));
        let guesses = r.pattern_guesses("Acme, Inc.");
        assert_eq!(guesses[0], "acme.com");
        assert!(guesses.contains(&"acmeinc.com".to_string()));
        assert!(r.pattern_guesses("Freelancer.com Client").is_empty());
        assert!(r.pattern_guesses("XY").is_empty());
    }

    #[test]
    fn hint_comes_before_source_url() {
        let r = resolver(FixedSearch(vec![]));
        let query = CompanyQuery::new("Acme")
            .with_job_domain_hint("careers.acme.co.uk")
            .with_source_url("https://boards.greenhouse.io/acme/jobs/1");
        assert_eq!(r.url_derived(&query), vec!["acme.co.uk"]);
    }

    #[test]
    fn empty_queries_are_rejected() {
        assert!(CompanyQuery::new("  ").validate().is_err());
        assert!(CompanyQuery::new("").with_source_url("https://acme.com").validate().is_ok());
        assert!(CompanyQuery::new("Acme").validate().is_ok());
    }
}
