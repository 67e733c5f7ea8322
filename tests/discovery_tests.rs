//! End-to-end discovery scenarios over in-memory fakes.
//!
//! No network: pages come from a fixed site map, MX answers from a table and
//! search from canned result lists.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use contactfinder::config::DiscoveryConfig;
use contactfinder::crawler::StopReason;
use contactfinder::fetch::FetchedPage;
use contactfinder::search::NoSearch;
use contactfinder::{
    BlockLists, CompanyQuery, CrawlBudget, DiscoveryEngine, DiscoveryError, DomainResolver,
    EmailValidator, InMemoryMxCache, MxResolver, MxSource, PageContext, PageFetcher, Result,
    Scorer, SearchHit, SiteCrawler, Tier, WebSearch,
};
use futures::StreamExt;
use url::Url;

/// Serves pages from a fixed URL -> HTML map; everything else is unreachable.
#[derive(Default)]
struct FakeWeb {
    pages: HashMap<String, String>,
    fetches: AtomicUsize,
}

impl FakeWeb {
    fn page(mut self, url: &str, title: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            format!("<html><head><title>{title}</title></head><body>{body}</body></html>"),
        );
        self
    }
}

#[async_trait]
impl PageFetcher for FakeWeb {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchedPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url.as_str()) {
            Some(body) => Ok(FetchedPage {
                url: url.clone(),
                status: 200,
                body: body.clone(),
            }),
            None => Err(DiscoveryError::network(
                "page fetch",
                url.as_str(),
                "connection refused",
            )),
        }
    }
}

/// Every page takes a fixed time to load and links to twenty more.
struct SlowWeb {
    delay: Duration,
}

#[async_trait]
impl PageFetcher for SlowWeb {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchedPage> {
        tokio::time::sleep(self.delay).await;
        let links: String = (0..20)
            .map(|i| format!(r#"<a href="/p{i}">Page {i}</a>"#))
            .collect();
        Ok(FetchedPage {
            url: url.clone(),
            status: 200,
            body: format!("<html><body>{links}<p>info@slow.dev</p></body></html>"),
        })
    }
}

/// Every MX lookup hangs far past any company deadline.
struct StalledMx;

#[async_trait]
impl MxSource for StalledMx {
    async fn lookup_mx(&self, domain: &str) -> Result<Option<String>> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(Some(format!("mx.{domain}")))
    }
}

/// Domains listed in the table have MX records; calls are counted.
struct FakeMx {
    with_mx: Vec<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl MxSource for FakeMx {
    async fn lookup_mx(&self, domain: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .with_mx
            .iter()
            .any(|d| *d == domain)
            .then(|| format!("mx.{domain}")))
    }
}

struct CannedSearch(Vec<&'static str>);

#[async_trait]
impl WebSearch for CannedSearch {
    fn name(&self) -> &'static str {
        "canned"
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

/// Results with titles and snippets.
struct QuotedSearch(Vec<SearchHit>);

#[async_trait]
impl WebSearch for QuotedSearch {
    fn name(&self) -> &'static str {
        "quoted"
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Ok(self.0.clone())
    }
}

struct Harness {
    engine: DiscoveryEngine,
    mx: Arc<FakeMx>,
}

fn engine(
    fetcher: Arc<dyn PageFetcher>,
    search: Arc<dyn WebSearch>,
    mx: Arc<dyn MxSource>,
) -> DiscoveryEngine {
    let blocklists = BlockLists::shared();
    let resolver = DomainResolver::new(Arc::clone(&blocklists), search, Duration::from_secs(1));
    let mx_resolver = MxResolver::new(
        mx,
        Arc::new(InMemoryMxCache::new(Duration::from_secs(3600))),
    );
    DiscoveryEngine::new(
        Arc::new(resolver),
        Arc::new(SiteCrawler::new(fetcher)),
        Arc::new(EmailValidator::new(Arc::clone(&blocklists), Arc::new(mx_resolver))),
        Arc::new(Scorer::new(blocklists)),
        DiscoveryConfig::default(),
    )
}

fn harness(fetcher: Arc<dyn PageFetcher>, search: Arc<dyn WebSearch>) -> Harness {
    let mx = Arc::new(FakeMx {
        with_mx: vec!["acme.com", "gmail.com", "globex.io", "initech.com", "slow.dev"],
        calls: AtomicUsize::new(0),
    });
    let engine = engine(fetcher, search, mx.clone());
    Harness { engine, mx }
}

fn acme_site() -> FakeWeb {
    FakeWeb::default()
        .page(
            "https://acme.com/",
            "Acme",
            r#"<a href="/careers">Careers</a><p>Questions? info@gmail.com</p>"#,
        )
        .page(
            "https://acme.com/careers",
            "Careers",
            "<h1>Open roles</h1><p>Apply: careers@acme.com</p>",
        )
}

fn budget() -> CrawlBudget {
    CrawlBudget {
        total_time_limit: Duration::from_secs(10),
        ..CrawlBudget::default()
    }
}

#[tokio::test]
async fn test_careers_address_ranks_above_free_mail() {
    let h = harness(Arc::new(acme_site()), Arc::new(NoSearch));
    let query = CompanyQuery::new("Acme").with_source_url("https://acme.com/jobs/123");

    let candidates = h.engine.discover(query, budget()).await.unwrap();

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].email, "careers@acme.com");
    assert_eq!(candidates[0].tier, Tier::HighlyRecommended);
    assert!(candidates[0].score >= 85);
    assert_eq!(candidates[0].page_context, PageContext::Careers);

    assert_eq!(candidates[1].email, "info@gmail.com");
    assert!(matches!(candidates[1].tier, Tier::LowQuality | Tier::Rejected));
}

#[tokio::test]
async fn test_job_platform_address_is_rejected() {
    let site = FakeWeb::default().page(
        "https://acme.com/",
        "Acme",
        "<p>Apply via jobs@linkedin.com</p>",
    );
    let h = harness(Arc::new(site), Arc::new(NoSearch));
    let query = CompanyQuery::new("Acme").with_source_url("https://acme.com/");

    let candidates = h.engine.discover(query, budget()).await.unwrap();

    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!((c.score, c.tier), (0, Tier::Rejected));
    assert!(c.reasons.iter().any(|r| r.contains("linkedin.com")));
    // Blocked addresses never reach DNS.
    assert_eq!(h.mx.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_company_yields_empty_result_within_budget() {
    let h = harness(Arc::new(FakeWeb::default()), Arc::new(NoSearch));
    let started = tokio::time::Instant::now();

    let report = h
        .engine
        .discover_detailed(CompanyQuery::new("Qzxv Holdings"), budget())
        .await
        .unwrap();

    assert!(report.candidates.is_empty());
    assert!(report.error.is_none());
    assert!(report.stats.domains_crawled > 0);
    assert_eq!(report.stats.pages_fetched, 0);
    assert!(started.elapsed() <= budget().total_time_limit);
}

#[tokio::test]
async fn test_duplicate_addresses_collapse_to_best_context() {
    let site = FakeWeb::default()
        .page(
            "https://acme.com/",
            "Acme",
            r#"<a href="/careers">Join us</a><p>Careers@Acme.com</p>"#,
        )
        .page(
            "https://acme.com/careers",
            "Careers",
            "<p>careers@acme.com</p>",
        );
    let h = harness(Arc::new(site), Arc::new(NoSearch));
    let query = CompanyQuery::new("Acme").with_source_url("https://acme.com/");

    let report = h.engine.discover_detailed(query, budget()).await.unwrap();

    assert_eq!(report.candidates.len(), 1);
    assert_eq!(report.stats.sightings, 2);
    assert_eq!(report.candidates[0].page_context, PageContext::Careers);
    assert!(report.candidates[0].page_url.ends_with("/careers"));
    assert_eq!(h.mx.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_search_derived_domain_is_crawled() {
    let site = FakeWeb::default().page(
        "https://globex.io/",
        "Globex",
        "<p>talent@globex.io</p>",
    );
    let search = CannedSearch(vec![
        "https://www.facebook.com/globex",
        "https://www.globex.io/",
    ]);
    let h = harness(Arc::new(site), Arc::new(search));

    let report = h
        .engine
        .discover_detailed(CompanyQuery::new("Globex Intl"), budget())
        .await
        .unwrap();

    assert_eq!(
        report.domains.last().map(|d| d.domain.as_str()),
        Some("globex.io")
    );
    assert_eq!(report.candidates.len(), 1);
    assert_eq!(report.candidates[0].email, "talent@globex.io");
    assert!(report.candidates[0].tier >= Tier::Acceptable);
}

#[tokio::test]
async fn test_address_in_search_snippet_is_scored_before_crawling() {
    let web = Arc::new(FakeWeb::default());
    let search = QuotedSearch(vec![
        SearchHit {
            url: "https://www.linkedin.com/company/initech".to_string(),
            title: "Initech | LinkedIn".to_string(),
            snippet: "Initech makes TPS reports.".to_string(),
        },
        SearchHit {
            url: "https://www.initech.com/about".to_string(),
            title: "About Initech".to_string(),
            snippet: "Hiring? Send your resume to talent@initech.com.".to_string(),
        },
    ]);
    let h = harness(web.clone(), Arc::new(search));

    let report = h
        .engine
        .discover_detailed(CompanyQuery::new("Initech"), budget())
        .await
        .unwrap();

    assert_eq!(report.candidates.len(), 1);
    let c = &report.candidates[0];
    assert_eq!(c.email, "talent@initech.com");
    assert_eq!(c.page_context, PageContext::Generic);
    assert_eq!(c.page_url, "https://www.initech.com/about");
    assert!(c.tier >= Tier::Acceptable);
    assert_eq!(report.stats.sightings, 1);
    assert!(report.stats.stopped_early);
    assert_eq!(report.stats.domains_crawled, 0);
    assert_eq!(web.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_mx_lookups_end_at_company_deadline() {
    let engine = engine(Arc::new(acme_site()), Arc::new(NoSearch), Arc::new(StalledMx));
    let query = CompanyQuery::new("Acme").with_source_url("https://acme.com/jobs/1");
    let started = tokio::time::Instant::now();

    let report = engine.discover_detailed(query, budget()).await.unwrap();

    assert!(started.elapsed() <= budget().total_time_limit);
    assert!(report.stats.deadline_hit);
    assert_eq!(report.candidates.len(), 2);
    for c in &report.candidates {
        assert!(
            c.reasons.iter().any(|r| r == "+0 no reachable mail exchanger"),
            "{}: {:?}",
            c.email,
            c.reasons
        );
    }
    assert_eq!(report.candidates[0].email, "careers@acme.com");
    assert_eq!(report.candidates[0].page_context, PageContext::Careers);
}

#[tokio::test]
async fn test_enough_candidates_stop_crawling_early() {
    let web = Arc::new(acme_site());
    let h = harness(web.clone(), Arc::new(NoSearch));
    let query = CompanyQuery::new("Acme").with_source_url("https://acme.com/jobs/1");

    let report = h.engine.discover_detailed(query, budget()).await.unwrap();

    assert!(report.stats.stopped_early);
    assert_eq!(report.stats.domains_crawled, 1);
    assert_eq!(web.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_query_is_rejected_before_network() {
    let web = Arc::new(acme_site());
    let h = harness(web.clone(), Arc::new(NoSearch));

    let err = h
        .engine
        .discover(CompanyQuery::new("   "), budget())
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::InvalidQuery { .. }));
    assert_eq!(web.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_discover_many_reports_carry_their_query() {
    let h = harness(Arc::new(acme_site()), Arc::new(NoSearch));
    let queries = vec![
        CompanyQuery::new("Acme").with_source_url("https://acme.com/jobs/1"),
        CompanyQuery::new(""),
        CompanyQuery::new("Acme Careers Mirror").with_job_domain_hint("acme.com"),
    ];

    let reports = h.engine.discover_many(queries, budget()).await;

    assert_eq!(reports.len(), 3);
    let by_name: HashMap<&str, _> = reports
        .iter()
        .map(|r| (r.query.company_name.as_str(), r))
        .collect();
    assert!(by_name[""].error.is_some());
    assert_eq!(by_name["Acme"].candidates[0].email, "careers@acme.com");
    assert_eq!(
        by_name["Acme Careers Mirror"].candidates[0].email,
        "careers@acme.com"
    );
    // gmail.com and acme.com resolved once each across both companies.
    assert_eq!(h.mx.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let h = harness(Arc::new(acme_site()), Arc::new(NoSearch));
    let query = CompanyQuery::new("Acme").with_source_url("https://acme.com/jobs/123");

    let report = h.engine.discover_detailed(query, budget()).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["query"]["source_url"], "https://acme.com/jobs/123");
    assert_eq!(json["domains"][0]["origin"], "URL_DERIVED");
    assert_eq!(json["candidates"][0]["tier"], "HIGHLY_RECOMMENDED");
    assert_eq!(json["stats"]["domains_crawled"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_crawl_respects_total_time_limit() {
    let crawler = SiteCrawler::new(Arc::new(SlowWeb {
        delay: Duration::from_secs(2),
    }));
    let budget = CrawlBudget {
        max_depth: 2,
        max_pages: 15,
        per_page_timeout: Duration::from_secs(5),
        total_time_limit: Duration::from_secs(5),
    };
    let started = tokio::time::Instant::now();

    let stream = crawler.crawl("slow.dev", budget);
    let progress = stream.progress();
    let _sightings: Vec<_> = stream.collect().await;

    let snapshot = progress.snapshot();
    assert!(started.elapsed() <= budget.total_time_limit + budget.per_page_timeout);
    assert!(snapshot.pages_fetched <= budget.max_pages);
    assert_eq!(snapshot.stop_reason, Some(StopReason::TimeLimit));
}

#[tokio::test]
async fn test_crawl_never_exceeds_max_pages() {
    let crawler = SiteCrawler::new(Arc::new(SlowWeb {
        delay: Duration::ZERO,
    }));
    let budget = CrawlBudget {
        max_pages: 4,
        ..CrawlBudget::default()
    };

    let stream = crawler.crawl("slow.dev", budget);
    let progress = stream.progress();
    let sightings: Vec<_> = stream.collect().await;

    assert_eq!(progress.snapshot().pages_fetched, 4);
    assert_eq!(sightings.len(), 4);
    assert_eq!(progress.snapshot().stop_reason, Some(StopReason::MaxPages));
}
