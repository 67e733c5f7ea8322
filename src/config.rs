//! Configuration management for contactfinder.
//!
//! This module provides structured configuration options that can be loaded
//! from environment-style key/value pairs. It centralizes crawl budgets,
//! network timeouts, cache TTLs and acceptance thresholds.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::crawler::CrawlBudget;

/// Main configuration structure.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Crawl budget applied to each company
    pub crawl: CrawlBudget,

    /// Orchestration thresholds and worker pool sizing
    pub discovery: DiscoveryConfig,

    /// Network operation settings
    pub network: NetworkConfig,

    /// MX cache settings
    pub cache: CacheConfig,

    /// Web search settings for the domain resolver
    pub search: SearchConfig,

    /// Logging settings
    pub telemetry: TelemetryConfig,
}

/// Orchestration thresholds.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Minimum score counted as ACCEPTABLE-or-better
    pub min_acceptable_score: u8,

    /// Stop crawling further domains once this many acceptable candidates exist
    pub min_acceptable_candidates: usize,

    /// Worker pool size for multi-company discovery
    pub max_concurrent_companies: usize,
}

/// Network-related configuration options
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Timeout for a single DNS query
    pub dns_timeout: Duration,

    /// Timeout for the web search step of domain resolution
    pub search_timeout: Duration,

    /// User agent sent with page fetches and search requests
    pub user_agent: String,

    /// Maximum body size read from a single page
    pub max_page_bytes: usize,

    /// Retry attempts for DNS and search requests (never page fetches)
    pub retry_attempts: u32,

    /// Initial delay between retry attempts
    pub retry_delay: Duration,
}

/// MX cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time after which a cached MX answer is stale
    pub mx_ttl: Duration,
}

/// Web search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Whether the search strategy runs at all
    pub enabled: bool,

    /// Google Custom Search API key
    pub google_api_key: Option<String>,

    /// Google Custom Search engine id (cx)
    pub google_engine_id: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Fallback filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_acceptable_score: 50,
            min_acceptable_candidates: 1,
            max_concurrent_companies: 4,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dns_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(10),
            user_agent: format!("contactfinder/{}", env!("CARGO_PKG_VERSION")),
            max_page_bytes: 2 * 1024 * 1024, // 2 MiB
            retry_attempts: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mx_ttl: Duration::from_secs(3600),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            google_api_key: None,
            google_engine_id: None,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl SearchConfig {
    /// Both Google credentials are present.
    pub fn has_google_credentials(&self) -> bool {
        self.google_api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.google_engine_id.as_deref().is_some_and(|c| !c.is_empty())
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    ///
    /// Unparseable values keep the default and emit a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Crawl budget
        if let Some(v) = parse_var::<usize>(&lookup, "CRAWL_DEPTH") {
            config.crawl.max_depth = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "CRAWL_MAX_PAGES") {
            config.crawl.max_pages = v;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CRAWL_TIMEOUT") {
            config.crawl.per_page_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TOTAL_CRAWL_TIME_LIMIT") {
            config.crawl.total_time_limit = Duration::from_secs(secs);
        }

        // Thresholds
        if let Some(v) = parse_var::<u8>(&lookup, "MIN_ACCEPTABLE_SCORE") {
            config.discovery.min_acceptable_score = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "MIN_ACCEPTABLE_CANDIDATES") {
            config.discovery.min_acceptable_candidates = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "MAX_CONCURRENT_COMPANIES") {
            config.discovery.max_concurrent_companies = v;
        }

        // Network + cache
        if let Some(secs) = parse_var::<u64>(&lookup, "DNS_TIMEOUT") {
            config.network.dns_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SEARCH_TIMEOUT") {
            config.network.search_timeout = Duration::from_secs(secs);
        }
        if let Some(ua) = lookup("CRAWL_USER_AGENT").filter(|s| !s.trim().is_empty()) {
            config.network.user_agent = ua;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "MX_CACHE_TTL") {
            config.cache.mx_ttl = Duration::from_secs(secs);
        }

        // Search
        if let Some(enabled) = lookup("SEARCH_ENABLED") {
            config.search.enabled = !(enabled.eq_ignore_ascii_case("false")
                || enabled == "0"
                || enabled.eq_ignore_ascii_case("no"));
        }
        config.search.google_api_key = lookup("GOOGLE_SEARCH_API_KEY").filter(|s| !s.is_empty());
        config.search.google_engine_id =
            lookup("GOOGLE_SEARCH_ENGINE_ID").filter(|s| !s.is_empty());

        if let Some(level) = lookup("LOG_LEVEL").filter(|s| !s.trim().is_empty()) {
            config.telemetry.log_level = level;
        }

        config
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.max_pages == 0 {
            return Err(ConfigError::invalid("crawl.max_pages", "0", "must be at least 1"));
        }
        if self.crawl.per_page_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "crawl.per_page_timeout",
                "0",
                "timeout must be greater than 0",
            ));
        }
        if self.crawl.total_time_limit.is_zero() {
            return Err(ConfigError::invalid(
                "crawl.total_time_limit",
                "0",
                "time limit must be greater than 0",
            ));
        }
        if self.discovery.min_acceptable_score > 100 {
            return Err(ConfigError::invalid(
                "discovery.min_acceptable_score",
                self.discovery.min_acceptable_score.to_string(),
                "score threshold must be within 0-100",
            ));
        }
        if self.discovery.max_concurrent_companies == 0 {
            return Err(ConfigError::invalid(
                "discovery.max_concurrent_companies",
                "0",
                "worker pool needs at least one slot",
            ));
        }
        if self.network.dns_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "network.dns_timeout",
                "0",
                "timeout must be greater than 0",
            ));
        }
        if self.cache.mx_ttl.is_zero() {
            return Err(ConfigError::invalid(
                "cache.mx_ttl",
                "0",
                "TTL must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for crate::errors::DiscoveryError {
    fn from(e: ConfigError) -> Self {
        crate::errors::DiscoveryError::configuration(e.to_string())
    }
}
