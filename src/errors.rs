//! Unified error handling for contact discovery.
//!
//! Errors follow a `thiserror`-based model with:
//!   * Typed variants for each failure domain (input, HTTP, DNS, search)
//!   * A categorization layer (`ErrorCategory`) for logs & reports
//!   * Helper constructors
//!
//! Only `DiscoveryError::InvalidQuery` ever reaches the caller of
//! `discover`; everything else is advisory and is logged then swallowed by
//! the stage that produced it.
//!
//! Categories are intentionally coarse:
//!   - Input: caller supplied an unusable query / configuration
//!   - Network: transient or remote-service problems
//!   - Parse: malformed documents, responses or unsupported content
//!   - Internal: logic bugs or unexpected states

use thiserror::Error;

/// High-level classification for structured reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Network,
    Parse,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Network => "network",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Primary library error type.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    // ------------------------ Input / Validation ----------------------------
    #[error("Invalid company query: {reason}")]
    InvalidQuery { reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ---------------------------- Parsing -----------------------------------
    #[error("Failed to parse {what} from '{target}': {reason}")]
    Parse {
        what: String,
        target: String,
        reason: String,
    },

    // ----------------------------- Network ----------------------------------
    #[error("Network error during {operation} for '{target}': {source}")]
    Network {
        operation: String,
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Fetch of {url} timed out after {millis}ms")]
    PageTimeout { url: String, millis: u64 },

    #[error("Unsupported content type '{content_type}' at {url}")]
    UnsupportedContent { url: String, content_type: String },

    #[error("DNS query timed out after {seconds}s: {query}")]
    DnsTimeout { query: String, seconds: u64 },

    #[error("DNS {record_type} lookup failed for {domain}: {reason}")]
    DnsResolution {
        domain: String,
        record_type: String,
        reason: String,
    },

    #[error("Web search for '{query}' failed: {reason}")]
    Search { query: String, reason: String },

    // ---------------------------- Internal ----------------------------------
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DiscoveryError {
    /// Categorize the error for structured output / logging.
    pub fn category(&self) -> ErrorCategory {
        use DiscoveryError::*;
        match self {
            InvalidQuery { .. } | Configuration { .. } => ErrorCategory::Input,

            Parse { .. } | UnsupportedContent { .. } => ErrorCategory::Parse,

            Network { .. }
            | HttpStatus { .. }
            | PageTimeout { .. }
            | DnsTimeout { .. }
            | DnsResolution { .. }
            | Search { .. } => ErrorCategory::Network,

            Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether repeating the same operation later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DiscoveryError::Network { .. }
            | DiscoveryError::PageTimeout { .. }
            | DiscoveryError::DnsTimeout { .. }
            | DiscoveryError::DnsResolution { .. } => true,
            DiscoveryError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            DiscoveryError::Search { reason, .. } => {
                let r = reason.to_ascii_lowercase();
                r.contains("timeout") || r.contains("rate limit") || r.contains("unavailable")
            }
            _ => false,
        }
    }

    // ---------------------------- Constructors -----------------------------

    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn parse(
        what: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Parse {
            what: what.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn network(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            operation: operation.into(),
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn page_timeout(url: impl Into<String>, millis: u64) -> Self {
        Self::PageTimeout {
            url: url.into(),
            millis,
        }
    }

    pub fn unsupported_content(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::UnsupportedContent {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    pub fn dns_timeout(query: impl Into<String>, seconds: u64) -> Self {
        Self::DnsTimeout {
            query: query.into(),
            seconds,
        }
    }

    pub fn dns_resolution(
        domain: impl Into<String>,
        record_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DnsResolution {
            domain: domain.into(),
            record_type: record_type.into(),
            reason: reason.into(),
        }
    }

    pub fn search(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Search {
            query: query.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_with(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Public result alias.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
