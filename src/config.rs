//! Configuration for the pool and the checker.

use crate::route::Route;

use std::time::Duration;

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Statically configured candidate routes.
    pub routes: Vec<Route>,
    /// URLs or file paths of remote route lists, fetched on every refresh.
    pub sources: Vec<String>,
    /// Cheap "echo my IP" endpoint used to probe routes.
    pub probe_url: String,
    /// Timeout for a single probe request.
    pub probe_timeout: Duration,
    /// Upper bound on concurrently running probes.
    pub probe_concurrency: usize,
    /// How long a verified usable-route set stays valid.
    pub ttl: Duration,
    /// Maximum requests per second allowed through any single route.
    pub max_requests_per_second: f64,
}

impl PoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `PoolConfig`.
pub struct PoolConfigBuilder {
    routes: Vec<Route>,
    sources: Vec<String>,
    probe_url: Option<String>,
    probe_timeout: Option<Duration>,
    probe_concurrency: Option<usize>,
    ttl: Option<Duration>,
    max_requests_per_second: Option<f64>,
}

impl PoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            sources: Vec::new(),
            probe_url: None,
            probe_timeout: None,
            probe_concurrency: None,
            ttl: None,
            max_requests_per_second: None,
        }
    }

    /// Set the statically configured candidate routes.
    pub fn routes(mut self, routes: Vec<Route>) -> Self {
        self.routes = routes;
        self
    }

    /// Set the remote route-list sources (URLs or file paths).
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the probe endpoint URL.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// Set the timeout for a single probe request.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set the upper bound on concurrently running probes.
    pub fn probe_concurrency(mut self, workers: usize) -> Self {
        self.probe_concurrency = Some(workers);
        self
    }

    /// Set how long a verified usable-route set stays valid.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the maximum requests per second per route.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PoolConfig {
        PoolConfig {
            routes: self.routes,
            sources: self.sources,
            probe_url: self
                .probe_url
                .unwrap_or_else(|| "http://httpbin.org/ip".to_string()),
            probe_timeout: self.probe_timeout.unwrap_or(Duration::from_secs(8)),
            probe_concurrency: self.probe_concurrency.unwrap_or(20),
            ttl: self.ttl.unwrap_or(Duration::from_secs(45 * 60)),
            max_requests_per_second: self.max_requests_per_second.unwrap_or(5.0),
        }
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry policy for a domain check: attempt budget plus backoff shape.
///
/// Decouples policy from mechanism; the same value object is shared by
/// single and batch checks.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Full passes over the backend list before giving up.
    pub max_attempts: usize,
    /// Pause between attempts.
    pub backoff_base: Duration,
    /// Uniform random extra added to each pause.
    pub backoff_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff_base: Duration, backoff_jitter: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
            backoff_jitter,
        }
    }

    /// Backoff duration for the next attempt, jitter included.
    pub fn backoff(&self) -> Duration {
        use rand::Rng;

        let jitter_ms = self.backoff_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.backoff_base;
        }
        let mut rng = rand::rng();
        self.backoff_base + Duration::from_millis(rng.random_range(0..=jitter_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_jitter: Duration::from_millis(500),
        }
    }
}

/// Configuration for the domain checker.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub retry: RetryPolicy,
    /// Per-call timeout for one backend request.
    pub call_timeout: Duration,
    /// Fixed pause between batches in `check_domains`.
    pub batch_delay: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(15),
            batch_delay: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn builder_applies_defaults() {
        let config = PoolConfig::builder().build();
        assert!(config.routes.is_empty());
        assert_eq!(config.probe_concurrency, 20);
        assert_eq!(config.probe_timeout, Duration::from_secs(8));
        assert!(config.ttl >= Duration::from_secs(30 * 60));
    }

    #[test]
    fn backoff_stays_within_jitter_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(50));
        for _ in 0..100 {
            let pause = policy.backoff();
            assert!(pause >= Duration::from_millis(100));
            assert!(pause <= Duration::from_millis(150));
        }
    }

    #[test]
    fn zero_jitter_is_fixed() {
        let policy = RetryPolicy::new(1, Duration::from_secs(2), Duration::ZERO);
        assert_eq!(policy.backoff(), Duration::from_secs(2));
        // rand stays linked in even for the zero-jitter path
        let _ = rand::rng().random_range(0..10);
    }
}
