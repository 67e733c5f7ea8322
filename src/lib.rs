//! ContactFinder Library
//!
//! Discovers, validates and ranks contact email addresses for a hiring
//! company, given its name and optionally a job-posting URL. The pipeline:
//!
//! - Resolve candidate domains (posting URL, name patterns, web search)
//! - Crawl each company site within a time/page budget, extracting addresses
//! - Validate syntax, block lists and MX reachability (cached)
//! - Score each address 0-100 and assign a recommendation tier
//!
//! Nothing is ever sent; the output is a ranked list per company.
//!
//! # Example
//!
//! ```rust,no_run
//! use contactfinder::{CompanyQuery, Config, CrawlBudget, DiscoveryEngine};
//!
//! # async fn run() -> contactfinder::Result<()> {
//! let config = Config::from_env();
//! let engine = DiscoveryEngine::from_config(&config)?;
//!
//! let query = CompanyQuery::new("Acme Robotics")
//!     .with_source_url("https://jobs.acmerobotics.com/openings/42");
//! for candidate in engine.discover(query, CrawlBudget::default()).await? {
//!     println!("{} {} {}", candidate.score, candidate.tier, candidate.email);
//! }
//! # Ok(())
//! # }
//! ```

pub mod blocklists;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod domain_utils;
pub mod emails;
pub mod errors;
pub mod fetch;
pub mod mx;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod scorer;
pub mod search;
pub mod telemetry;
pub mod validator;

// Re-export commonly used types for convenience
pub use blocklists::{BlockCategory, BlockLists};
pub use config::Config;
pub use crawler::{CrawlBudget, CrawlStream, PageContext, RawEmailSighting, SiteCrawler};
pub use discovery::DiscoveryEngine;
pub use errors::{DiscoveryError, ErrorCategory, Result};
pub use fetch::{HttpFetcher, PageFetcher};
pub use mx::{InMemoryMxCache, MxCache, MxResolver, MxSource};
pub use report::{CompanyDiscovery, DiscoveryStats};
pub use resolver::{CandidateDomain, CompanyQuery, DomainOrigin, DomainResolver};
pub use scorer::{ScoredCandidate, Scorer, Tier};
pub use search::{SearchHit, WebSearch};
pub use validator::{EmailValidator, ValidationResult};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
