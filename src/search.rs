//! Web search collaborators for the domain resolver.
//!
//! Search is advisory: callers swallow errors and move on. Two backends are
//! provided:
//!   * `GoogleCustomSearch` (JSON API, needs a key and an engine id)
//!   * `DuckDuckGoHtmlSearch` (keyless HTML endpoint)
//!
//! `NoSearch` turns the step off entirely.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::{NetworkConfig, SearchConfig};
use crate::errors::{DiscoveryError, Result};
use crate::retry::{NetworkRetryPolicy, RetryConfig, RetryExecutor};

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Disabled search.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSearch;

#[async_trait]
impl WebSearch for NoSearch {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// Pick the backend the configuration asks for.
pub fn from_config(search: &SearchConfig, network: &NetworkConfig) -> Result<Box<dyn WebSearch>> {
    if !search.enabled {
        return Ok(Box::new(NoSearch));
    }
    let client = reqwest::Client::builder()
        .user_agent(&network.user_agent)
        .timeout(network.search_timeout)
        .build()
        .map_err(|e| DiscoveryError::internal_with("failed to build search client", e))?;
    let retry = RetryConfig {
        max_attempts: network.retry_attempts,
        initial_delay: network.retry_delay,
        ..RetryConfig::default()
    };

    match (&search.google_api_key, &search.google_engine_id) {
        (Some(key), Some(cx)) if search.has_google_credentials() => Ok(Box::new(
            GoogleCustomSearch::new(client, key.clone(), cx.clone()).with_retry(retry),
        )),
        _ => Ok(Box::new(DuckDuckGoHtmlSearch::new(client).with_retry(retry))),
    }
}

fn classify_status(query: &str, status: reqwest::StatusCode) -> DiscoveryError {
    let reason = match status.as_u16() {
        429 => "rate limited (429)".to_string(),
        s if s >= 500 => format!("service unavailable ({s})"),
        s => format!("unexpected status {s}"),
    };
    DiscoveryError::search(query, reason)
}

fn classify_transport(query: &str, e: reqwest::Error) -> DiscoveryError {
    if e.is_timeout() {
        DiscoveryError::search(query, "timeout")
    } else if e.is_connect() {
        DiscoveryError::search(query, format!("service unavailable: {e}"))
    } else {
        DiscoveryError::search(query, e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Google Custom Search
// ---------------------------------------------------------------------------

const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

pub struct GoogleCustomSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
    retry: RetryExecutor,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleCustomSearch {
    pub fn new(client: reqwest::Client, api_key: String, engine_id: String) -> Self {
        Self {
            client,
            endpoint: GOOGLE_ENDPOINT.to_string(),
            api_key,
            engine_id,
            retry: RetryExecutor::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    async fn request(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", "10"),
            ])
            .send()
            .await
            .map_err(|e| classify_transport(query, e))?;
        if !response.status().is_success() {
            return Err(classify_status(query, response.status()));
        }
        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::parse("search response", "google", e.to_string()))?;
        Ok(body
            .items
            .into_iter()
            .map(|item| SearchHit {
                url: item.link,
                title: item.title,
                snippet: item.snippet,
            })
            .collect())
    }
}

#[async_trait]
impl WebSearch for GoogleCustomSearch {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let hits = self
            .retry
            .execute(|| self.request(query), &NetworkRetryPolicy)
            .await?;
        debug!(backend = "google", query, hits = hits.len(), "search complete");
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// DuckDuckGo HTML
// ---------------------------------------------------------------------------

const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

static RESULT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a").expect("valid selector"));
static RESULT_SNIPPET: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result__snippet").expect("valid selector"));

pub struct DuckDuckGoHtmlSearch {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryExecutor,
}

impl DuckDuckGoHtmlSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
            retry: RetryExecutor::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    async fn request(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| classify_transport(query, e))?;
        if !response.status().is_success() {
            return Err(classify_status(query, response.status()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(query, e))?;
        Ok(parse_duckduckgo_results(&body))
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoHtmlSearch {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let hits = self
            .retry
            .execute(|| self.request(query), &NetworkRetryPolicy)
            .await?;
        debug!(backend = "duckduckgo", query, hits = hits.len(), "search complete");
        Ok(hits)
    }
}

/// Extract results from the DuckDuckGo HTML page, unwrapping `/l/?uddg=` redirects.
pub fn parse_duckduckgo_results(html: &str) -> Vec<SearchHit> {
    let doc = Html::parse_document(html);
    let snippets: Vec<String> = doc
        .select(&RESULT_SNIPPET)
        .map(|s| s.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .collect();

    doc.select(&RESULT_LINK)
        .enumerate()
        .filter_map(|(i, a)| {
            let target = decode_result_href(a.value().attr("href")?)?;
            Some(SearchHit {
                url: target,
                title: a.text().collect::<Vec<_>>().join(" ").trim().to_string(),
                snippet: snippets.get(i).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

fn decode_result_href(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let url = base.join(href.trim()).ok()?;
    if url.host_str() == Some("duckduckgo.com") && url.path().starts_with("/l/") {
        return url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Bound a search by `limit`; elapsed searches count as transient failures.
pub async fn search_within(
    backend: &dyn WebSearch,
    query: &str,
    limit: Duration,
) -> Result<Vec<SearchHit>> {
    match tokio::time::timeout(limit, backend.search(query)).await {
        Ok(result) => result,
        Err(_) => Err(DiscoveryError::search(query, "timeout")),
    }
}
