//! Per-site request pacing and proxy rotation
//!
//! Every site task owns a governor. Before each fetch attempt the task
//! acquires it, which waits out the configured delay since the site's
//! previous request and hands back the proxy endpoint to use. After the
//! attempt the task releases it with the outcome so the shared pool can
//! tally per-endpoint failures.

use crate::fetch::ProxyEndpoint;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// What a fetch attempt did, reported back on release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Succeeded,
    Failed,
}

struct PoolState {
    cursor: usize,
    failures: Vec<u64>,
}

/// Round-robin proxy pool shared by every site in a run
///
/// The rotation cursor is the only mutable state sites share during a
/// run. Endpoints are never removed mid-run; failures are tallied per
/// endpoint for the run report.
pub struct ProxyPool {
    endpoints: Vec<Url>,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    /// Builds a pool, or None when no endpoints are given
    pub fn new(endpoints: Vec<Url>) -> Option<Self> {
        if endpoints.is_empty() {
            return None;
        }

        let failures = vec![0; endpoints.len()];
        Some(Self {
            endpoints,
            state: Mutex::new(PoolState {
                cursor: 0,
                failures,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Hands out the next endpoint in rotation
    pub async fn next_endpoint(&self) -> ProxyEndpoint {
        let mut state = self.state.lock().await;
        let index = state.cursor;
        state.cursor = (state.cursor + 1) % self.endpoints.len();

        ProxyEndpoint {
            index,
            url: self.endpoints[index].clone(),
        }
    }

    /// Counts one failed attempt against an endpoint
    pub async fn record_failure(&self, endpoint: &ProxyEndpoint) {
        let mut state = self.state.lock().await;
        if let Some(count) = state.failures.get_mut(endpoint.index) {
            *count += 1;
        }
    }

    /// Snapshot of per-endpoint failure counts
    pub async fn failure_counts(&self) -> Vec<(Url, u64)> {
        let state = self.state.lock().await;
        self.endpoints
            .iter()
            .cloned()
            .zip(state.failures.iter().copied())
            .collect()
    }
}

/// Paces one site's requests and rotates proxies for them
pub struct Governor {
    delay: Duration,
    pool: Option<Arc<ProxyPool>>,
    last_request: Mutex<Option<Instant>>,
}

impl Governor {
    pub fn new(delay: Duration, pool: Option<Arc<ProxyPool>>) -> Self {
        Self {
            delay,
            pool,
            last_request: Mutex::new(None),
        }
    }

    /// Waits out the site's delay, then hands back the next proxy
    ///
    /// The first request of a site goes out immediately. Later requests
    /// wait the configured delay since the previous acquire, jittered up
    /// to twenty percent either way so the timing does not look
    /// mechanical.
    pub async fn acquire(&self) -> Option<ProxyEndpoint> {
        let wait = {
            let last = self.last_request.lock().await;
            last.map(|at| jittered(self.delay).saturating_sub(at.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        if wait > Duration::ZERO {
            debug!(?wait, "pacing request");
            tokio::time::sleep(wait).await;
        }

        *self.last_request.lock().await = Some(Instant::now());

        match &self.pool {
            Some(pool) => Some(pool.next_endpoint().await),
            None => None,
        }
    }

    /// Reports how the paired fetch attempt went
    pub async fn release(&self, endpoint: Option<&ProxyEndpoint>, outcome: RequestOutcome) {
        if outcome == RequestOutcome::Failed {
            if let (Some(pool), Some(endpoint)) = (&self.pool, endpoint) {
                pool.record_failure(endpoint).await;
            }
        }
    }
}

/// The configured delay scaled by a random factor in [0.8, 1.2)
fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }

    let factor = 0.8 + fastrand::f64() * 0.4;
    delay.mul_f64(factor)
}
