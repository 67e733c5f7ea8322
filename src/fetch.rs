//! Page fetching seam used by the site crawler.
//!
//! [`HttpFetcher`] is the production implementation (reqwest). Failures of
//! any kind are returned as errors and the crawler skips the page; nothing
//! here retries.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::config::NetworkConfig;
use crate::errors::{DiscoveryError, Result};

/// Media types worth scanning for addresses; anything else is skipped.
const ACCEPTED_MEDIA_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];

/// A successfully fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// Fetch one page within `timeout`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage>;
}

/// reqwest-backed fetcher with a body size cap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| DiscoveryError::internal_with("failed to build HTTP client", e))?;
        Ok(Self { client, max_bytes })
    }

    pub fn from_config(network: &NetworkConfig) -> Result<Self> {
        Self::new(&network.user_agent, network.max_page_bytes)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");
        let mut response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml,text/plain;q=0.8")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::http_status(url.as_str(), status.as_u16()));
        }

        if let Some(ct) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let ct = ct.to_ascii_lowercase();
            if !is_accepted_media_type(&ct) {
                return Err(DiscoveryError::unsupported_content(url.as_str(), ct));
            }
        }

        let final_url = response.url().clone();
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_send_error(url, timeout, e))?
        {
            let room = self.max_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_bytes {
                debug!(url = %url, max_bytes = self.max_bytes, "truncating oversized page");
                break;
            }
        }

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

fn is_accepted_media_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    ACCEPTED_MEDIA_TYPES.contains(&essence)
}

fn map_send_error(url: &Url, timeout: Duration, e: reqwest::Error) -> DiscoveryError {
    if e.is_timeout() {
        DiscoveryError::page_timeout(url.as_str(), timeout.as_millis() as u64)
    } else {
        DiscoveryError::network("page fetch", url.as_str(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new("contactfinder-test", 1024).unwrap()
    }

    #[tokio::test]
    async fn fetches_html_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/careers"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<p>careers@acme.com</p>"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/careers", server.uri())).unwrap();
        let page = fetcher().fetch(&url, Duration::from_secs(2)).await.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.body.contains("careers@acme.com"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher().fetch(&url, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn binary_content_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0u8; 16]),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/logo.png", server.uri())).unwrap();
        let err = fetcher().fetch(&url, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedContent { .. }));
    }

    #[tokio::test]
    async fn stylesheets_and_scripts_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site.css"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("a::after { content: 'hr@acme.com' }", "text/css"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/app.js"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("var a = 1;", "text/javascript"),
            )
            .mount(&server)
            .await;

        for asset in ["site.css", "app.js"] {
            let url = Url::parse(&format!("{}/{asset}", server.uri())).unwrap();
            let err = fetcher().fetch(&url, Duration::from_secs(2)).await.unwrap_err();
            assert!(matches!(err, DiscoveryError::UnsupportedContent { .. }), "{asset}");
        }
    }

    #[test]
    fn media_type_essence_is_compared() {
        assert!(is_accepted_media_type("text/html; charset=utf-8"));
        assert!(is_accepted_media_type("application/xhtml+xml"));
        assert!(is_accepted_media_type("text/plain"));
        assert!(!is_accepted_media_type("text/css"));
        assert!(!is_accepted_media_type("text/csv"));
        assert!(!is_accepted_media_type("application/json"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("a".repeat(4096)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let page = fetcher().fetch(&url, Duration::from_secs(2)).await.unwrap();
        assert_eq!(page.body.len(), 1024);
    }

    #[tokio::test]
    async fn slow_pages_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let err = fetcher()
            .fetch(&url, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::PageTimeout { .. }));
    }
}
