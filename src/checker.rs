//! Domain block checker: bounded retries, route failover, backend fallback.

use crate::backend::CheckBackend;
use crate::config::CheckerConfig;
use crate::error::CallError;
use crate::pool::ProxyPool;
use crate::route::Route;
use crate::status::{BlockStatus, CheckResult};

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Slack on top of the client timeout so the outer guard only fires when a
/// call truly hangs.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Resolves a domain's blocked status against an ordered list of backends,
/// rotating routes from a shared [`ProxyPool`].
///
/// Route failures and backend failures are recovered independently: a dead
/// proxy is evicted and the same backend retried on another route, while a
/// dead upstream falls through to the next backend. Neither ever aborts a
/// batch or the process; the worst case is an `Unknown` result.
pub struct DomainBlockChecker {
    pool: Arc<ProxyPool>,
    backends: Vec<Arc<dyn CheckBackend>>,
    config: CheckerConfig,
}

impl DomainBlockChecker {
    pub fn new(
        pool: Arc<ProxyPool>,
        backends: Vec<Arc<dyn CheckBackend>>,
        config: CheckerConfig,
    ) -> Self {
        Self {
            pool,
            backends,
            config,
        }
    }

    /// Check a single domain. Always completes within
    /// `max_attempts * (backends * call_timeout + backoff)`.
    pub async fn check_domain(&self, domain: &str) -> CheckResult {
        let mut results = self.check_batch(&[domain.to_string()]).await;
        results
            .pop()
            .unwrap_or_else(|| CheckResult::unresolved(domain, None))
    }

    /// Check many domains, split into chunks the primary backend can
    /// swallow, with a fixed pause between chunks to stay under upstream
    /// rate limits. One chunk failing never aborts the rest; its domains
    /// simply come back `Unknown`.
    pub async fn check_domains(&self, domains: &[String]) -> Vec<CheckResult> {
        let chunk_size = self
            .backends
            .first()
            .map(|b| b.batch_limit().max(1))
            .unwrap_or(1);

        let chunks: Vec<&[String]> = domains.chunks(chunk_size).collect();
        let total = chunks.len();
        let mut results = Vec::with_capacity(domains.len());

        for (index, chunk) in chunks.into_iter().enumerate() {
            info!(
                "checking batch {}/{} ({} domains)",
                index + 1,
                total,
                chunk.len()
            );
            results.extend(self.check_batch(chunk).await);
            if index + 1 < total {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }
        results
    }

    /// Run the attempt loop for one chunk. Results come back in input order.
    async fn check_batch(&self, domains: &[String]) -> Vec<CheckResult> {
        let mut verdicts: HashMap<String, CheckResult> = HashMap::new();
        let mut pending: Vec<String> = domains.to_vec();
        // Route-level retries are budgeted separately from attempts, capped
        // at the number of candidate routes.
        let mut route_retries_left = self.pool.candidate_count().max(1);
        let mut last_error: Option<String> = None;

        'attempts: for attempt in 1..=self.config.retry.max_attempts.max(1) {
            for backend in &self.backends {
                if pending.is_empty() {
                    break 'attempts;
                }
                debug!(
                    "attempt {}: {} domain(s) via {}",
                    attempt,
                    pending.len(),
                    backend.name()
                );

                let mut still_pending = Vec::new();
                let sub_chunks: Vec<Vec<String>> = pending
                    .chunks(backend.batch_limit().max(1))
                    .map(|c| c.to_vec())
                    .collect();

                for sub in sub_chunks {
                    match self
                        .call_backend(backend.as_ref(), &sub, &mut route_retries_left)
                        .await
                    {
                        Ok(statuses) => {
                            for domain in sub {
                                match statuses.get(&domain) {
                                    Some(status @ (BlockStatus::Blocked | BlockStatus::NotBlocked)) => {
                                        verdicts.insert(
                                            domain.clone(),
                                            CheckResult::answered(
                                                &domain,
                                                *status,
                                                backend.name(),
                                                backend.confidence(),
                                            ),
                                        );
                                    }
                                    _ => {
                                        debug!(
                                            "{} gave no verdict for {}",
                                            backend.name(),
                                            domain
                                        );
                                        still_pending.push(domain);
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            warn!(
                                "{} failed for {} domain(s): {}",
                                backend.name(),
                                sub.len(),
                                err
                            );
                            last_error = Some(err.to_string());
                            still_pending.extend(sub);
                        }
                    }
                }
                pending = still_pending;
            }

            if pending.is_empty() {
                break;
            }
            if attempt < self.config.retry.max_attempts {
                tokio::time::sleep(self.config.retry.backoff()).await;
            }
        }

        domains
            .iter()
            .map(|domain| {
                verdicts
                    .get(domain)
                    .cloned()
                    .unwrap_or_else(|| CheckResult::unresolved(domain, last_error.clone()))
            })
            .collect()
    }

    /// One backend call with route failover.
    ///
    /// A route-level failure evicts the route and retries the same backend
    /// on a freshly picked one; it never counts against the backend order.
    /// Once the retry budget is gone, one final direct attempt is made;
    /// only a direct-connection failure itself is reported as
    /// application-level so the normal fallback chain takes over.
    async fn call_backend(
        &self,
        backend: &dyn CheckBackend,
        domains: &[String],
        route_retries_left: &mut usize,
    ) -> Result<HashMap<String, BlockStatus>, CallError> {
        let mut force_direct = false;
        loop {
            let route = if force_direct {
                Route::Direct
            } else {
                self.pool.pick_route().await.unwrap_or(Route::Direct)
            };
            self.pool.throttle(&route).await;

            let client = match route.build_client(self.config.call_timeout) {
                Ok(client) => client,
                Err(e) => {
                    warn!("cannot build client for route {}: {}", route, e);
                    force_direct |= self.route_failed(&route, route_retries_left, &e.to_string())?;
                    continue;
                }
            };

            debug!("calling {} via {}", backend.name(), route);
            let outcome = match tokio::time::timeout(
                self.config.call_timeout + TIMEOUT_GRACE,
                backend.check(&client, domains),
            )
            .await
            {
                Ok(result) => result,
                // A hung call is converted into a normal retryable failure;
                // timeouts on backend calls are application-level per the
                // error taxonomy.
                Err(_) => Err(CallError::Timeout),
            };

            match outcome {
                Ok(statuses) => return Ok(statuses),
                Err(err) if err.is_route_level() => {
                    warn!("route {} failed calling {}: {}", route, backend.name(), err);
                    force_direct |= self.route_failed(&route, route_retries_left, &err.to_string())?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Handle a route-level failure: evict and decide what comes next.
    /// Returns `true` when the retry budget is spent and the one remaining
    /// move is a direct attempt. Errors returned here are application-level
    /// by design; only the direct connection failing produces one, since
    /// there is nothing left to swap to.
    fn route_failed(
        &self,
        route: &Route,
        route_retries_left: &mut usize,
        detail: &str,
    ) -> Result<bool, CallError> {
        if *route == Route::Direct {
            return Err(CallError::Application(format!(
                "direct connection failed: {detail}"
            )));
        }
        self.pool.evict(route);
        if *route_retries_left == 0 {
            warn!("route retries exhausted; trying direct connection");
            return Ok(true);
        }
        *route_retries_left -= 1;
        Ok(false)
    }
}
