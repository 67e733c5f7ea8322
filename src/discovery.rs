//! Discovery orchestration.
//!
//! One company runs strictly as resolve -> crawl -> validate -> score under a
//! single company deadline (`CrawlBudget::total_time_limit`). Addresses quoted
//! in search results are scored first; then candidate domains are crawled in
//! priority order. After each step the new unique addresses are validated
//! and everything is re-scored, and crawling stops once enough acceptable
//! candidates exist. MX lookups share the deadline: whatever is still
//! pending when it passes is scored without MX evidence.
//!
//! Many companies run in parallel on a bounded pool of tokio tasks. Reports
//! come back in completion order and carry their query.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, error, info, info_span};

use crate::blocklists::BlockLists;
use crate::config::{Config, DiscoveryConfig};
use crate::crawler::{CrawlBudget, RawEmailSighting, SiteCrawler};
use crate::emails::canonical;
use crate::errors::{DiscoveryError, Result};
use crate::fetch::HttpFetcher;
use crate::mx::MxResolver;
use crate::report::{CompanyDiscovery, DiscoveryStats};
use crate::resolver::{CompanyQuery, DomainResolver};
use crate::retry::RetryConfig;
use crate::scorer::{ScoredCandidate, Scorer};
use crate::search;
use crate::validator::{EmailValidator, ValidationResult};

/// The discovery pipeline. Cheap to clone; all components are shared.
#[derive(Clone)]
pub struct DiscoveryEngine {
    resolver: Arc<DomainResolver>,
    crawler: Arc<SiteCrawler>,
    validator: Arc<EmailValidator>,
    scorer: Arc<Scorer>,
    settings: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(
        resolver: Arc<DomainResolver>,
        crawler: Arc<SiteCrawler>,
        validator: Arc<EmailValidator>,
        scorer: Arc<Scorer>,
        settings: DiscoveryConfig,
    ) -> Self {
        Self {
            resolver,
            crawler,
            validator,
            scorer,
            settings,
        }
    }

    /// Production stack: reqwest fetcher, trust-dns MX source, configured
    /// search backend, built-in block lists.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let blocklists = BlockLists::shared();

        let search: Arc<dyn search::WebSearch> =
            Arc::from(search::from_config(&config.search, &config.network)?);
        let resolver = DomainResolver::new(
            Arc::clone(&blocklists),
            search,
            config.network.search_timeout,
        );

        let crawler = SiteCrawler::new(Arc::new(HttpFetcher::from_config(&config.network)?));

        let mx = MxResolver::with_dns(config.network.dns_timeout, config.cache.mx_ttl).with_retry(
            RetryConfig {
                max_attempts: config.network.retry_attempts,
                initial_delay: config.network.retry_delay,
                ..RetryConfig::default()
            },
        );
        let validator = EmailValidator::new(Arc::clone(&blocklists), Arc::new(mx));
        let scorer = Scorer::new(blocklists);

        Ok(Self::new(
            Arc::new(resolver),
            Arc::new(crawler),
            Arc::new(validator),
            Arc::new(scorer),
            config.discovery.clone(),
        ))
    }

    /// Ranked candidates for one company, best first. Empty when nothing was
    /// found; the only error is an invalid query.
    pub async fn discover(
        &self,
        query: CompanyQuery,
        budget: CrawlBudget,
    ) -> Result<Vec<ScoredCandidate>> {
        Ok(self.discover_detailed(query, budget).await?.candidates)
    }

    /// Like [`discover`](Self::discover) but returns the full report.
    pub async fn discover_detailed(
        &self,
        query: CompanyQuery,
        budget: CrawlBudget,
    ) -> Result<CompanyDiscovery> {
        query.validate()?;
        let span = info_span!("discover", company = %query);
        Ok(self.run(query, budget).instrument(span).await)
    }

    /// Run many companies on a bounded pool. Reports arrive in completion
    /// order; invalid queries yield a report with `error` set.
    pub async fn discover_many(
        &self,
        queries: Vec<CompanyQuery>,
        budget: CrawlBudget,
    ) -> Vec<CompanyDiscovery> {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_companies.max(1)));
        let mut pending = FuturesUnordered::new();

        for query in queries {
            let engine = self.clone();
            let permits = Arc::clone(&permits);
            let task_query = query.clone();
            let handle = tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let err = DiscoveryError::internal_with("worker pool closed", e);
                        return CompanyDiscovery::failed(task_query, &err);
                    }
                };
                match engine.discover_detailed(task_query.clone(), budget).await {
                    Ok(report) => report,
                    Err(e) => {
                        info!(company = %task_query, error = %e, "query rejected");
                        CompanyDiscovery::failed(task_query, &e)
                    }
                }
            });
            pending.push(async move { (query, handle.await) });
        }

        let mut reports = Vec::new();
        while let Some((query, joined)) = pending.next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(company = %query, error = %e, "discovery task failed");
                    let err = DiscoveryError::internal_with("discovery task failed", e);
                    reports.push(CompanyDiscovery::failed(query, &err));
                }
            }
        }
        reports
    }

    async fn run(&self, query: CompanyQuery, budget: CrawlBudget) -> CompanyDiscovery {
        let started = Instant::now();
        let deadline = started + budget.total_time_limit;
        let mut report = CompanyDiscovery::new(query);

        let resolution = self.resolver.resolve_detailed(&report.query, deadline).await;
        report.domains = resolution.domains;
        report.stats.domains_resolved = report.domains.len();
        let job_domain = self.resolver.url_derived(&report.query).into_iter().next();

        let mut pool = CandidatePool::default();
        let mut enough = false;
        if !resolution.search_sightings.is_empty() {
            report.stats.sightings += resolution.search_sightings.len();
            for sighting in resolution.search_sightings {
                pool.absorb(sighting);
            }
            let acceptable = self
                .settle(&mut pool, &report.query, job_domain.as_deref(), deadline, &mut report.stats)
                .await;
            debug!(acceptable, "search result addresses scored");
            enough = acceptable >= self.settings.min_acceptable_candidates;
        }

        for candidate in &report.domains {
            if enough {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                report.stats.deadline_hit = true;
                debug!(domain = %candidate.domain, "company deadline reached");
                break;
            }

            let mut stream = self
                .crawler
                .crawl(&candidate.domain, budget.with_time_limit(remaining));
            let progress = stream.progress();
            while let Some(sighting) = stream.next().await {
                report.stats.sightings += 1;
                pool.absorb(sighting);
            }
            let snapshot = progress.snapshot();
            report.stats.domains_crawled += 1;
            report.stats.pages_fetched += snapshot.pages_fetched;
            report.stats.pages_failed += snapshot.pages_failed;

            let acceptable = self
                .settle(&mut pool, &report.query, job_domain.as_deref(), deadline, &mut report.stats)
                .await;
            debug!(
                domain = %candidate.domain,
                origin = ?candidate.origin,
                pages = snapshot.pages_fetched,
                acceptable,
                "domain crawled"
            );
            enough = acceptable >= self.settings.min_acceptable_candidates;
        }
        if enough {
            report.stats.stopped_early = true;
        }

        report.candidates = pool.into_ranked();
        report.stats.unique_emails = report.candidates.len();
        report.stats.actionable = report
            .actionable(self.settings.min_acceptable_score)
            .count();
        report.stats.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            candidates = report.candidates.len(),
            actionable = report.stats.actionable,
            best = report.best().map(|c| c.email.as_str()).unwrap_or("-"),
            duration_ms = report.stats.duration_ms,
            "discovery finished"
        );
        report
    }

    /// Validate new entries and re-score the pool; returns how many
    /// candidates reach the threshold.
    async fn settle(
        &self,
        pool: &mut CandidatePool,
        query: &CompanyQuery,
        job_domain: Option<&str>,
        deadline: Instant,
        stats: &mut DiscoveryStats,
    ) -> usize {
        if !self.validate_pending(pool, job_domain, deadline).await {
            stats.deadline_hit = true;
        }
        self.score_all(pool, query, job_domain)
    }

    /// Returns false when the deadline passed first; the unfinished entries
    /// then carry offline results (`mx_ok = false`).
    async fn validate_pending(
        &self,
        pool: &mut CandidatePool,
        job_domain: Option<&str>,
        deadline: Instant,
    ) -> bool {
        let pending: Vec<usize> = pool
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.validation.is_none())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return true;
        }

        let lookups = join_all(pending.iter().map(|&i| {
            let sighting = &pool.entries[i].sighting;
            let job_domain = job_domain.unwrap_or(&sighting.found_on_domain);
            self.validator.validate(&sighting.email, job_domain)
        }));
        let outcome = timeout_at(deadline, lookups).await;

        match outcome {
            Ok(results) => {
                for (i, result) in pending.into_iter().zip(results) {
                    pool.entries[i].validation = Some(result);
                }
                true
            }
            Err(_) => {
                debug!(pending = pending.len(), "deadline reached during validation");
                for i in pending {
                    let offline = self.validator.check_offline(&pool.entries[i].sighting.email);
                    pool.entries[i].validation = Some(offline);
                }
                false
            }
        }
    }

    /// Re-score every validated entry; returns how many reach the threshold.
    fn score_all(
        &self,
        pool: &mut CandidatePool,
        query: &CompanyQuery,
        job_domain: Option<&str>,
    ) -> usize {
        let min_score = self.settings.min_acceptable_score;
        let mut acceptable = 0;
        for entry in &mut pool.entries {
            let Some(validation) = &entry.validation else {
                continue;
            };
            let job_domain = job_domain.unwrap_or(&entry.sighting.found_on_domain);
            let scored = self.scorer.score(
                validation,
                &entry.sighting,
                job_domain,
                &query.company_name,
            );
            if scored.is_actionable(min_score) {
                acceptable += 1;
            }
            entry.scored = Some(scored);
        }
        acceptable
    }
}

struct PoolEntry {
    sighting: RawEmailSighting,
    validation: Option<ValidationResult>,
    scored: Option<ScoredCandidate>,
}

/// Unique addresses in discovery order, keyed by canonical form.
#[derive(Default)]
struct CandidatePool {
    entries: Vec<PoolEntry>,
    index: HashMap<String, usize>,
}

impl CandidatePool {
    /// Keep one entry per canonical address, upgrading to the sighting with
    /// the better page context.
    fn absorb(&mut self, sighting: RawEmailSighting) {
        let key = canonical(&sighting.email);
        match self.index.get(&key) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if sighting.page_context.priority() > entry.sighting.page_context.priority() {
                    entry.sighting = sighting;
                    entry.scored = None;
                }
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(PoolEntry {
                    sighting,
                    validation: None,
                    scored: None,
                });
            }
        }
    }

    /// Descending by score; discovery order breaks ties.
    fn into_ranked(self) -> Vec<ScoredCandidate> {
        let mut ranked: Vec<ScoredCandidate> =
            self.entries.into_iter().filter_map(|e| e.scored).collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::PageContext;

    fn sighting(email: &str, context: PageContext, url: &str) -> RawEmailSighting {
        RawEmailSighting {
            email: email.to_string(),
            found_on_domain: "acme.com".to_string(),
            page_context: context,
            page_url: url.to_string(),
        }
    }

    #[test]
    fn pool_keeps_best_context_per_address() {
        let mut pool = CandidatePool::default();
        pool.absorb(sighting("Careers@Acme.com", PageContext::Generic, "https://acme.com/"));
        pool.absorb(sighting("info@acme.com", PageContext::Generic, "https://acme.com/"));
        pool.absorb(sighting(
            "careers@acme.com",
            PageContext::Careers,
            "https://acme.com/careers",
        ));
        pool.absorb(sighting("CAREERS@acme.com", PageContext::About, "https://acme.com/about"));

        assert_eq!(pool.entries.len(), 2);
        let first = &pool.entries[0].sighting;
        assert_eq!(first.page_context, PageContext::Careers);
        assert_eq!(first.page_url, "https://acme.com/careers");
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let scorer = Scorer::new(BlockLists::shared());
        let validation = ValidationResult {
            syntax_ok: true,
            mx_ok: true,
            ..ValidationResult::default()
        };
        let mut pool = CandidatePool::default();
        for email in ["b@acme.com", "a@acme.com", "careers@acme.com"] {
            pool.absorb(sighting(email, PageContext::Generic, "https://acme.com/"));
        }
        for entry in &mut pool.entries {
            // Unrelated domain keeps scores below the cap so the prefix decides.
            entry.scored = Some(scorer.score(&validation, &entry.sighting, "", "Zeta"));
        }

        let ranked: Vec<String> = pool.into_ranked().into_iter().map(|c| c.email).collect();
        assert_eq!(ranked, vec!["careers@acme.com", "b@acme.com", "a@acme.com"]);
    }
}
