//! Serializable per-company discovery report.
//!
//! `CompanyDiscovery` carries its originating query so results from the
//! worker pool can be correlated without relying on ordering.

use serde::Serialize;

use crate::errors::{DiscoveryError, Result};
use crate::resolver::{CandidateDomain, CompanyQuery};
use crate::scorer::{ScoredCandidate, Tier};

/// Root report for one company.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CompanyDiscovery {
    /// Tool name and version
    pub tool: String,

    /// The query this report answers
    pub query: CompanyQuery,

    /// Candidate domains in the order they were considered
    pub domains: Vec<CandidateDomain>,

    /// Ranked candidates, best first
    pub candidates: Vec<ScoredCandidate>,

    pub stats: DiscoveryStats,

    /// Rejection or internal failure, if the discovery did not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Counters and timings for one discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DiscoveryStats {
    pub domains_resolved: usize,
    pub domains_crawled: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub sightings: usize,
    pub unique_emails: usize,
    pub actionable: usize,
    /// Crawling stopped because enough acceptable candidates were found
    pub stopped_early: bool,
    /// The company deadline cut discovery short
    pub deadline_hit: bool,
    pub duration_ms: u64,
}

impl CompanyDiscovery {
    pub fn new(query: CompanyQuery) -> Self {
        Self {
            tool: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            query,
            domains: Vec::new(),
            candidates: Vec::new(),
            stats: DiscoveryStats::default(),
            error: None,
            generated_at: chrono::Utc::now(),
        }
    }

    /// Report for a query that was rejected before any network activity.
    pub fn failed(query: CompanyQuery, error: &DiscoveryError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(query)
        }
    }

    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }

    /// Candidates at or above `min_score` (rejected ones never qualify).
    pub fn actionable(&self, min_score: u8) -> impl Iterator<Item = &ScoredCandidate> {
        self.candidates
            .iter()
            .filter(move |c| c.is_actionable(min_score))
    }

    pub fn count_tier(&self, tier: Tier) -> usize {
        self.candidates.iter().filter(|c| c.tier == tier).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DiscoveryError::internal_with("failed to serialize report", e))
    }
}
