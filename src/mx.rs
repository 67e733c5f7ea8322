//! MX reachability checks with a process-wide TTL cache.
//!
//! [`MxResolver`] is the only component holding state shared across
//! concurrent company pipelines. The cache sits behind the [`MxCache`]
//! trait so an external store can replace [`InMemoryMxCache`] without
//! touching callers. Staleness is checked on every read.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{ResolverConfig, ResolverOpts},
    error::ResolveErrorKind,
};

use crate::errors::{DiscoveryError, Result};
use crate::retry::{DnsRetryPolicy, RetryConfig, RetryExecutor};

/// DNS seam: answers `Some(exchange_host)` when the domain publishes MX
/// records, `None` when it definitively does not (NXDOMAIN / no records).
/// Transient resolver failures are errors.
#[async_trait]
pub trait MxSource: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> Result<Option<String>>;
}

/// Production MX source backed by trust-dns.
pub struct DnsMxSource {
    resolver: TokioAsyncResolver,
    query_timeout: Duration,
}

impl DnsMxSource {
    pub fn new(query_timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = query_timeout;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);
        Self {
            resolver,
            query_timeout,
        }
    }
}

#[async_trait]
impl MxSource for DnsMxSource {
    async fn lookup_mx(&self, domain: &str) -> Result<Option<String>> {
        let fut = self.resolver.mx_lookup(domain);
        match timeout(self.query_timeout, fut).await {
            Ok(Ok(answer)) => {
                let best = answer
                    .iter()
                    .min_by_key(|mx| mx.preference())
                    .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_string())
                    // RFC 7505 null MX: the domain accepts no mail.
                    .filter(|host| !host.is_empty());
                Ok(best)
            }
            Ok(Err(e)) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
                _ => Err(DiscoveryError::dns_resolution(domain, "MX", e.to_string())),
            },
            Err(_) => Err(DiscoveryError::dns_timeout(
                format!("MX {domain}"),
                self.query_timeout.as_secs(),
            )),
        }
    }
}

/// Cached MX answer for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxCacheEntry {
    pub domain: String,
    pub mx_ok: bool,
    pub mx_host: Option<String>,
    pub resolved_at: Instant,
}

impl MxCacheEntry {
    pub fn new(domain: impl Into<String>, mx_host: Option<String>) -> Self {
        Self {
            domain: domain.into(),
            mx_ok: mx_host.is_some(),
            mx_host,
            resolved_at: Instant::now(),
        }
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.resolved_at.elapsed() >= ttl
    }
}

/// Cache interface with explicit TTL eviction.
pub trait MxCache: Send + Sync {
    /// Fresh entry for `domain`; a stale entry is evicted and reported as a miss.
    fn get(&self, domain: &str) -> Option<MxCacheEntry>;
    fn put(&self, entry: MxCacheEntry);
    /// Drop every stale entry, returning how many were removed.
    fn evict_expired(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutex-guarded in-process cache.
pub struct InMemoryMxCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, MxCacheEntry>>,
}

impl InMemoryMxCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl MxCache for InMemoryMxCache {
    fn get(&self, domain: &str) -> Option<MxCacheEntry> {
        let mut entries = self.entries.lock();
        match entries.get(domain) {
            Some(entry) if !entry.is_stale(self.ttl) => Some(entry.clone()),
            Some(_) => {
                entries.remove(domain);
                None
            }
            None => None,
        }
    }

    fn put(&self, entry: MxCacheEntry) {
        self.entries.lock().insert(entry.domain.clone(), entry);
    }

    fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_stale(self.ttl));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Outcome of a reachability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxStatus {
    pub mx_ok: bool,
    pub mx_host: Option<String>,
    pub from_cache: bool,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MxStats {
    pub hits: u64,
    pub misses: u64,
    pub queries: u64,
    pub failures: u64,
}

/// Cached MX reachability resolver.
pub struct MxResolver {
    source: Arc<dyn MxSource>,
    cache: Arc<dyn MxCache>,
    retry: RetryExecutor,
    hits: AtomicU64,
    misses: AtomicU64,
    queries: AtomicU64,
    failures: AtomicU64,
}

impl MxResolver {
    pub fn new(source: Arc<dyn MxSource>, cache: Arc<dyn MxCache>) -> Self {
        Self {
            source,
            cache,
            retry: RetryExecutor::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// trust-dns source with an in-memory cache.
    pub fn with_dns(query_timeout: Duration, ttl: Duration) -> Self {
        Self::new(
            Arc::new(DnsMxSource::new(query_timeout)),
            Arc::new(InMemoryMxCache::new(ttl)),
        )
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    pub fn cache(&self) -> &Arc<dyn MxCache> {
        &self.cache
    }

    /// Check whether `domain` accepts mail. Never fails: resolution errors
    /// yield `mx_ok = false` and are not cached.
    pub async fn check(&self, domain: &str) -> MxStatus {
        let key = domain.trim().trim_end_matches('.').to_ascii_lowercase();

        if let Some(entry) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(domain = %key, mx_ok = entry.mx_ok, "MX cache hit");
            return MxStatus {
                mx_ok: entry.mx_ok,
                mx_host: entry.mx_host,
                from_cache: true,
            };
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = self
            .retry
            .execute(
                || {
                    self.queries.fetch_add(1, Ordering::Relaxed);
                    self.source.lookup_mx(&key)
                },
                &DnsRetryPolicy,
            )
            .await;

        match result {
            Ok(host) => {
                debug!(domain = %key, mx_host = ?host, "MX resolved");
                let entry = MxCacheEntry::new(key, host);
                self.cache.put(entry.clone());
                MxStatus {
                    mx_ok: entry.mx_ok,
                    mx_host: entry.mx_host,
                    from_cache: false,
                }
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(domain = %key, category = %e.category(), error = %e, "MX lookup failed");
                MxStatus {
                    mx_ok: false,
                    mx_host: None,
                    from_cache: false,
                }
            }
        }
    }

    pub fn stats(&self) -> MxStats {
        MxStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
