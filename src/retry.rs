//! Retry utilities for advisory network operations with exponential backoff.
//!
//! Only DNS queries and search requests go through this module. Page fetches
//! are never retried: the crawl time budget makes blind retries
//! counterproductive.

use std::fmt::Display;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::errors::DiscoveryError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries (for exponential backoff)
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,

    /// Maximum total time to spend retrying
    pub max_total_duration: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
            max_total_duration: Some(Duration::from_secs(15)),
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Policy for determining if an operation should be retried
pub trait RetryPolicy<E> {
    /// Returns true if the operation should be retried for this error
    fn should_retry(&self, error: &E, attempt: u32) -> bool;
}

/// Retry policy for HTTP search requests.
pub struct NetworkRetryPolicy;

impl RetryPolicy<DiscoveryError> for NetworkRetryPolicy {
    fn should_retry(&self, error: &DiscoveryError, attempt: u32) -> bool {
        attempt < 3 && error.is_transient()
    }
}

/// DNS-specific retry policy: timeouts and SERVFAIL-like failures only.
pub struct DnsRetryPolicy;

impl RetryPolicy<DiscoveryError> for DnsRetryPolicy {
    fn should_retry(&self, error: &DiscoveryError, attempt: u32) -> bool {
        attempt < 2
            && matches!(
                error,
                DiscoveryError::DnsTimeout { .. } | DiscoveryError::DnsResolution { .. }
            )
    }
}

/// Retry executor that handles the retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryExecutor {
    /// Create a new retry executor with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an async operation with retry logic
    pub async fn execute<F, Fut, T, E, P>(&self, operation: F, policy: &P) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: RetryPolicy<E>,
        E: Display,
    {
        let start_time = Instant::now();
        let mut delay = self.config.initial_delay;
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            let out_of_time = self
                .config
                .max_total_duration
                .is_some_and(|max| start_time.elapsed() + delay >= max);
            if attempt >= self.config.max_attempts
                || out_of_time
                || !policy.should_retry(&error, attempt)
            {
                return Err(error);
            }

            let actual_delay = if self.config.jitter {
                add_jitter(delay)
            } else {
                delay
            };
            debug!(attempt, delay_ms = actual_delay.as_millis() as u64, error = %error, "retrying");
            sleep(actual_delay).await;

            delay = std::cmp::min(
                Duration::from_millis(
                    (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64,
                ),
                self.config.max_delay,
            );
            attempt += 1;
        }
    }
}

/// Add random jitter to prevent thundering herd problems
fn add_jitter(delay: Duration) -> Duration {
    use rand::Rng;

    let jitter_range = delay.as_millis() as f64 * 0.1; // 10% jitter
    if jitter_range <= 0.0 {
        return delay;
    }
    let mut rng = rand::rng();
    let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);

    let jittered_ms = (delay.as_millis() as f64 + jitter).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}
