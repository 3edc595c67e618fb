//! Core proxy pool implementation.

use crate::config::PoolConfig;
use crate::route::{Route, RouteHealth};
use crate::utils;

use futures::stream::{self, StreamExt};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

type RouteLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Response shape of httpbin-style "echo my IP" probe endpoints.
#[derive(Deserialize)]
struct EchoIp {
    origin: String,
}

/// Snapshot of pool state for logging and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub candidates: usize,
    pub usable: usize,
    pub evicted: usize,
}

struct PoolState {
    /// Candidate routes known to the pool: static config plus whatever the
    /// last source fetch produced.
    candidates: Vec<Route>,
    /// Health records for routes verified in the current TTL window.
    health: HashMap<Route, RouteHealth>,
    /// Routes evicted since the last wholesale refresh. They cannot return
    /// until the next refresh re-probes them.
    evicted: HashSet<Route>,
    /// When the current TTL window opened; `None` before the first refresh.
    refreshed_at: Option<Instant>,
    /// Whether the last refresh found any usable route at all.
    had_usable: bool,
    /// Consecutive refresh cycles that ended with zero usable routes.
    empty_refreshes: u32,
    /// Per-route rate limiters, created on demand.
    limiters: HashMap<Route, Arc<RouteLimiter>>,
}

/// A pool of egress routes verified by periodic liveness probes.
///
/// All mutable state lives behind one internal lock; callers share the pool
/// through an `Arc` and interact only via `pick_route`, `evict`, `refresh`
/// and friends. Probe failures are ordinary "not usable" outcomes, never
/// errors: a pool with nothing usable simply answers `None` and callers
/// degrade to the direct connection.
pub struct ProxyPool {
    /// Configuration for the pool.
    pub config: PoolConfig,
    inner: Mutex<PoolState>,
    /// Single-flight gate for refreshes: a caller arriving while a refresh
    /// is pending waits for it instead of starting a duplicate.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl ProxyPool {
    /// Create a new pool. No probing happens here; the first `pick_route`
    /// (or an explicit `refresh`) populates the usable set.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let candidates = config.routes.clone();
        Arc::new(Self {
            config,
            inner: Mutex::new(PoolState {
                candidates,
                health: HashMap::new(),
                evicted: HashSet::new(),
                refreshed_at: None,
                had_usable: false,
                empty_refreshes: 0,
                limiters: HashMap::new(),
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Re-probe every candidate route and replace the usable set wholesale.
    ///
    /// Returns the number of usable routes found. Zero is a normal state:
    /// it is logged (escalating after two consecutive empty cycles) and the
    /// pool answers `None` from `pick_route` until the next window.
    pub async fn refresh(&self) -> usize {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> usize {
        // Gather candidates: static config plus remote sources.
        let mut candidates = self.config.routes.clone();
        for source in &self.config.sources {
            match utils::fetch_routes_from_source(source).await {
                Ok(fetched) => {
                    info!("fetched {} routes from {}", fetched.len(), source);
                    candidates.extend(fetched);
                }
                Err(e) => {
                    warn!("failed to fetch routes from {}: {}", source, e);
                }
            }
        }
        // Dedupe while keeping configured order.
        let mut seen = HashSet::new();
        candidates.retain(|route| seen.insert(route.clone()));

        info!("probing {} candidate routes", candidates.len());

        let probe_url = self.config.probe_url.clone();
        let probe_timeout = self.config.probe_timeout;
        let results: Vec<(Route, RouteHealth)> = stream::iter(candidates.iter().cloned())
            .map(|route| {
                let probe_url = probe_url.clone();
                async move {
                    let health = probe_route(&route, &probe_url, probe_timeout).await;
                    (route, health)
                }
            })
            .buffer_unordered(self.config.probe_concurrency.max(1))
            .collect()
            .await;

        let (usable, empty_cycles, total) = {
            let mut state = self.inner.lock();
            state.candidates = candidates;
            state.health.clear();
            state.evicted.clear();
            for (route, health) in results {
                state.health.insert(route, health);
            }
            let usable = state.health.values().filter(|h| h.usable).count();
            state.refreshed_at = Some(Instant::now());
            state.had_usable = usable > 0;
            if usable == 0 {
                state.empty_refreshes += 1;
            } else {
                state.empty_refreshes = 0;
            }
            (usable, state.empty_refreshes, state.candidates.len())
        };

        if usable == 0 {
            // Once per refresh cycle, not per domain.
            if empty_cycles >= 2 {
                error!(
                    "no usable route after {} refresh cycles; degrading to direct connection",
                    empty_cycles
                );
            } else {
                warn!("no usable route among {} candidates; will use direct connection", total);
            }
        } else {
            info!("pool refreshed: {}/{} routes usable", usable, total);
        }
        usable
    }

    /// Pick a route for immediate use, or `None` meaning "connect direct".
    ///
    /// The choice is uniform random over the usable set to spread load. An
    /// empty or expired cache triggers a refresh first, deduplicated across
    /// concurrent callers by the refresh gate.
    pub async fn pick_route(&self) -> Option<Route> {
        if !self.needs_refresh() {
            return self.pick_cached();
        }
        let _gate = self.refresh_gate.lock().await;
        // A waiter may find the set already refreshed by whoever held the gate.
        if self.needs_refresh() {
            self.refresh_locked().await;
        }
        self.pick_cached()
    }

    fn needs_refresh(&self) -> bool {
        let state = self.inner.lock();
        let stale = match state.refreshed_at {
            None => true,
            Some(at) => at.elapsed() >= self.config.ttl,
        };
        if stale {
            return true;
        }
        // Evictions can drain a window that originally had usable routes.
        state.had_usable && !state.health.values().any(|h| h.usable)
    }

    fn pick_cached(&self) -> Option<Route> {
        let state = self.inner.lock();
        let usable: Vec<&Route> = state
            .health
            .iter()
            .filter(|(_, health)| health.usable)
            .map(|(route, _)| route)
            .collect();
        if usable.is_empty() {
            debug!("no usable route cached");
            return None;
        }
        let mut rng = rand::rng();
        let picked = usable[rng.random_range(0..usable.len())].clone();
        debug!("picked route {}", picked);
        Some(picked)
    }

    /// Remove a route from the usable set after an observed failure.
    ///
    /// Idempotent; other entries keep their TTL. The route stays out until
    /// the next wholesale refresh re-probes it.
    pub fn evict(&self, route: &Route) {
        let mut state = self.inner.lock();
        if state.health.remove(route).is_some() {
            info!("evicted route {}", route);
        } else {
            debug!("evict of unknown route {} ignored", route);
        }
        state.evicted.insert(route.clone());
    }

    /// Record an externally verified route as usable.
    ///
    /// Used by embedders whose routes are validated out of band. Refused for
    /// routes evicted in the current window. Opens a TTL window if none is
    /// open yet.
    pub fn mark_usable(&self, route: Route, egress_ip: Option<String>) {
        let mut state = self.inner.lock();
        if state.evicted.contains(&route) {
            debug!("ignoring mark_usable for evicted route {}", route);
            return;
        }
        if !state.candidates.contains(&route) {
            state.candidates.push(route.clone());
        }
        state.health.insert(route, RouteHealth::usable(egress_ip));
        state.had_usable = true;
        if state.refreshed_at.is_none() {
            state.refreshed_at = Some(Instant::now());
        }
    }

    /// Wait until the per-route rate limit admits one more request.
    pub async fn throttle(&self, route: &Route) {
        let limiter = {
            let mut state = self.inner.lock();
            let quota = Quota::per_second(
                NonZeroU32::new(self.config.max_requests_per_second.ceil() as u32)
                    .unwrap_or(NonZeroU32::MIN),
            );
            state
                .limiters
                .entry(route.clone())
                .or_insert_with(|| Arc::new(RateLimiter::direct(quota)))
                .clone()
        };
        limiter.until_ready().await;
    }

    /// Number of candidate routes currently known to the pool.
    pub fn candidate_count(&self) -> usize {
        self.inner.lock().candidates.len()
    }

    /// Whether a route is in the current usable set.
    pub fn is_usable(&self, route: &Route) -> bool {
        self.inner
            .lock()
            .health
            .get(route)
            .map(|h| h.usable)
            .unwrap_or(false)
    }

    /// Health record of a route, if one exists in the current window.
    pub fn health_of(&self, route: &Route) -> Option<RouteHealth> {
        self.inner.lock().health.get(route).cloned()
    }

    /// Get statistics about the pool.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            candidates: state.candidates.len(),
            usable: state.health.values().filter(|h| h.usable).count(),
            evicted: state.evicted.len(),
        }
    }
}

/// Probe one route: GET the probe endpoint and expect HTTP 200 in time.
///
/// Timeouts and refusals are ordinary "not usable" outcomes here; an
/// unresponsive proxy is indistinguishable from a dead one.
async fn probe_route(route: &Route, probe_url: &str, timeout: Duration) -> RouteHealth {
    let client = match route.build_client(timeout) {
        Ok(client) => client,
        Err(e) => {
            debug!("cannot build client for {}: {}", route, e);
            return RouteHealth::unusable();
        }
    };

    match client.get(probe_url).send().await {
        Ok(resp) if resp.status() == StatusCode::OK => {
            let egress_ip = resp.json::<EchoIp>().await.ok().map(|echo| echo.origin);
            match &egress_ip {
                Some(ip) => debug!("probe ok for {} (egress {})", route, ip),
                None => debug!("probe ok for {}", route),
            }
            RouteHealth::usable(egress_ip)
        }
        Ok(resp) => {
            debug!("probe for {} returned {}", route, resp.status());
            RouteHealth::unusable()
        }
        Err(e) => {
            debug!("probe for {} failed: {}", route, e);
            RouteHealth::unusable()
        }
    }
}
