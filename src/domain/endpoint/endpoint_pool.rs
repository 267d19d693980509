//! Per-chain pool of node endpoints with circuit breakers and health ranking

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::chain_node::ChainNode;
use super::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::shared::errors::{EndpointError, NodeError};
use crate::shared::types::ChainId;
use crate::shared::utils::backoff_delay;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub breaker: CircuitBreakerConfig,
    /// First delay between failover attempts
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
struct EndpointHealth {
    breaker: CircuitBreaker,
    score: f64,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_success_instant: Option<Instant>,
}

/// A single remote node, owned by its pool
pub struct Endpoint {
    id: usize,
    chain: ChainId,
    url: String,
    node: Arc<dyn ChainNode>,
    health: Mutex<EndpointHealth>,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
}

impl Endpoint {
    fn new(id: usize, chain: ChainId, url: String, node: Arc<dyn ChainNode>, config: CircuitBreakerConfig) -> Self {
        Self {
            id,
            chain,
            url,
            node,
            health: Mutex::new(EndpointHealth {
                breaker: CircuitBreaker::new(config),
                score: 1.0,
                last_success: None,
                last_failure: None,
                last_success_instant: None,
            }),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }

    fn state_at(&self, now: Instant) -> (CircuitState, f64) {
        let mut health = self.health.lock();
        let state = health.breaker.state_at(now);
        (state, health.score)
    }
}

/// Serializable view of one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub id: usize,
    pub chain: ChainId,
    pub url: String,
    pub state: CircuitState,
    pub health: f64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub total_failures: u64,
}

/// Permission to dispatch one call to one endpoint. The outcome goes back
/// through `EndpointPool::record_success` / `record_failure`.
pub struct EndpointLease {
    endpoint: Arc<Endpoint>,
    admission: Admission,
    settled: bool,
}

impl EndpointLease {
    pub fn node(&self) -> Arc<dyn ChainNode> {
        Arc::clone(&self.endpoint.node)
    }

    pub fn endpoint_id(&self) -> usize {
        self.endpoint.id
    }

    pub fn url(&self) -> &str {
        &self.endpoint.url
    }

    pub fn is_probe(&self) -> bool {
        self.admission == Admission::Probe
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Probe {
            self.endpoint.health.lock().breaker.release_probe();
        }
    }
}

/// Endpoint pool for one chain
pub struct EndpointPool {
    chain: ChainId,
    endpoints: Vec<Arc<Endpoint>>,
    config: PoolConfig,
    created_at: Instant,
}

impl EndpointPool {
    pub fn new(chain: ChainId, nodes: Vec<(String, Arc<dyn ChainNode>)>, config: PoolConfig) -> Self {
        let endpoints = nodes
            .into_iter()
            .enumerate()
            .map(|(id, (url, node))| Arc::new(Endpoint::new(id, chain.clone(), url, node, config.breaker.clone())))
            .collect();

        Self {
            chain,
            endpoints,
            config,
            created_at: Instant::now(),
        }
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Select the best endpoint for a call
    pub fn acquire(&self) -> Result<EndpointLease, EndpointError> {
        self.acquire_excluding(&HashSet::new())
    }

    /// Select the best endpoint, skipping ids already tried by the caller.
    /// Highest-health CLOSED first, then a HALF_OPEN probe, never OPEN.
    pub fn acquire_excluding(&self, exclude: &HashSet<usize>) -> Result<EndpointLease, EndpointError> {
        let now = Instant::now();

        let mut closed: Vec<(&Arc<Endpoint>, f64)> = self
            .endpoints
            .iter()
            .filter(|e| !exclude.contains(&e.id))
            .filter_map(|e| match e.state_at(now) {
                (CircuitState::Closed, score) => Some((e, score)),
                _ => None,
            })
            .collect();
        closed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.id.cmp(&b.0.id)));

        for (endpoint, _) in closed {
            if let Some(admission) = endpoint.health.lock().breaker.try_admit(now) {
                return Ok(self.lease(endpoint, admission));
            }
        }

        for endpoint in self.endpoints.iter().filter(|e| !exclude.contains(&e.id)) {
            if let Some(admission) = endpoint.health.lock().breaker.try_admit(now) {
                if admission == Admission::Probe {
                    debug!("Probing endpoint {} on {}", endpoint.url, self.chain);
                }
                return Ok(self.lease(endpoint, admission));
            }
        }

        Err(EndpointError::CircuitOpen {
            chain: self.chain.clone(),
        })
    }

    fn lease(&self, endpoint: &Arc<Endpoint>, admission: Admission) -> EndpointLease {
        endpoint.total_requests.fetch_add(1, Ordering::Relaxed);
        EndpointLease {
            endpoint: Arc::clone(endpoint),
            admission,
            settled: false,
        }
    }

    /// Feed a successful outcome back into the endpoint
    pub fn record_success(&self, mut lease: EndpointLease) {
        lease.settled = true;
        let mut health = lease.endpoint.health.lock();
        let alpha = self.config.breaker.health_alpha;
        health.score = nudge(health.score, 1.0, alpha);
        health.breaker.on_success(lease.admission);
        health.last_success = Some(Utc::now());
        health.last_success_instant = Some(Instant::now());
    }

    /// Feed a failed outcome back into the endpoint
    pub fn record_failure(&self, mut lease: EndpointLease, error: &NodeError) {
        lease.settled = true;
        lease.endpoint.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut health = lease.endpoint.health.lock();
        let alpha = self.config.breaker.health_alpha;
        health.score = nudge(health.score, 0.0, alpha);
        health.breaker.on_failure(Instant::now());
        health.last_failure = Some(Utc::now());
        warn!(
            "Endpoint {} on {} failed ({} in a row): {}",
            lease.endpoint.url,
            self.chain,
            health.breaker.consecutive_failures(),
            error
        );
    }

    fn settle<T>(&self, lease: EndpointLease, result: &Result<T, NodeError>) {
        match result {
            Err(err) if err.is_endpoint_fault() => self.record_failure(lease, err),
            _ => self.record_success(lease),
        }
    }

    /// Dispatch one call to the selected endpoint and record its outcome
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, EndpointError>
    where
        F: FnOnce(Arc<dyn ChainNode>) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let lease = self.acquire()?;
        let result = op(lease.node()).await;
        self.settle(lease, &result);
        result.map_err(EndpointError::Node)
    }

    /// Dispatch a call, moving to the next viable endpoint on endpoint faults.
    /// Node answers (RPC errors, reverts) are returned immediately.
    pub async fn call_with_failover<T, F, Fut>(&self, max_attempts: u32, op: F) -> Result<T, EndpointError>
    where
        F: Fn(Arc<dyn ChainNode>) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let attempts = max_attempts.max(1);
        let mut tried = HashSet::new();
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(
                    attempt - 1,
                    self.config.retry_base_delay,
                    self.config.retry_max_delay,
                ))
                .await;
            }

            // fall back to an endpoint already tried when nothing fresh is left
            let lease = match self.acquire_excluding(&tried) {
                Ok(lease) => lease,
                Err(_) if !tried.is_empty() => self.acquire()?,
                Err(err) => return Err(err),
            };
            tried.insert(lease.endpoint_id());

            let result = op(lease.node()).await;
            self.settle(lease, &result);
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_endpoint_fault() => {
                    debug!("Attempt {}/{} on {} failed: {}", attempt + 1, attempts, self.chain, err);
                    last_error = Some(err);
                }
                Err(err) => return Err(EndpointError::Node(err)),
            }
        }

        Err(EndpointError::Exhausted {
            attempts,
            last: last_error.unwrap_or_else(|| NodeError::Transport("no attempt made".to_string())),
        })
    }

    /// How long the pool has gone without any CLOSED endpoint
    pub fn outage_duration(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut outage_start = None;
        for endpoint in &self.endpoints {
            let mut health = endpoint.health.lock();
            if health.breaker.state_at(now) == CircuitState::Closed {
                return None;
            }
            let started = health
                .breaker
                .tripped_at()
                .or(health.last_success_instant)
                .unwrap_or(self.created_at);
            outage_start = Some(outage_start.map_or(started, |s: Instant| s.max(started)));
        }
        outage_start.map(|start| now.saturating_duration_since(start))
    }

    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let now = Instant::now();
        self.endpoints
            .iter()
            .map(|endpoint| {
                let mut health = endpoint.health.lock();
                EndpointSnapshot {
                    id: endpoint.id,
                    chain: endpoint.chain.clone(),
                    url: endpoint.url.clone(),
                    state: health.breaker.state_at(now),
                    health: health.score,
                    consecutive_failures: health.breaker.consecutive_failures(),
                    last_success: health.last_success,
                    last_failure: health.last_failure,
                    total_requests: endpoint.total_requests.load(Ordering::Relaxed),
                    total_failures: endpoint.total_failures.load(Ordering::Relaxed),
                }
            })
            .collect()
    }
}

/// Move `score` a fraction `alpha` of the way toward `target`
fn nudge(score: f64, target: f64, alpha: f64) -> f64 {
    let alpha = alpha.clamp(0.0, 1.0);
    (score + alpha * (target - score)).clamp(0.0, 1.0)
}

/// Explicitly owned set of pools, one per chain
#[derive(Default)]
pub struct EndpointRegistry {
    pools: HashMap<ChainId, Arc<EndpointPool>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pool: EndpointPool) -> Arc<EndpointPool> {
        let pool = Arc::new(pool);
        self.pools.insert(pool.chain().clone(), Arc::clone(&pool));
        pool
    }

    pub fn get(&self, chain: &ChainId) -> Option<Arc<EndpointPool>> {
        self.pools.get(chain).cloned()
    }

    pub fn pools(&self) -> impl Iterator<Item = &Arc<EndpointPool>> {
        self.pools.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNode;

    fn pool_config(threshold: u32, cooldown: Duration) -> PoolConfig {
        PoolConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: threshold,
                failure_window: Duration::from_secs(60),
                base_cooldown: cooldown,
                max_cooldown: Duration::from_secs(60),
                backoff_multiplier: 2.0,
                jitter_ratio: 0.0,
                health_alpha: 0.2,
            },
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
        }
    }

    fn pool_of(nodes: &[Arc<MockNode>], config: PoolConfig) -> EndpointPool {
        let nodes = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (format!("http://node-{}", i), Arc::clone(node) as Arc<dyn ChainNode>))
            .collect();
        EndpointPool::new(ChainId::new("ethereum"), nodes, config)
    }

    fn fault() -> NodeError {
        NodeError::Transport("connection reset".into())
    }

    #[test]
    fn test_health_moves_monotonically_and_stays_bounded() {
        let mut score = 1.0;
        for _ in 0..50 {
            let next = nudge(score, 0.0, 0.2);
            assert!(next <= score && (0.0..=1.0).contains(&next));
            score = next;
        }
        for _ in 0..50 {
            let next = nudge(score, 1.0, 0.2);
            assert!(next >= score && (0.0..=1.0).contains(&next));
            score = next;
        }
        assert_eq!(nudge(0.5, 1.0, 7.0), 1.0);
    }

    #[tokio::test]
    async fn test_five_failures_open_circuit_and_reroute() {
        let a = Arc::new(MockNode::new());
        let b = Arc::new(MockNode::new());
        let pool = pool_of(&[a.clone(), b.clone()], pool_config(5, Duration::from_secs(60)));

        // pin the failures on endpoint 0; health ranking would move plain
        // acquires to endpoint 1 after the first one
        let only_first = HashSet::from([1]);
        for _ in 0..5 {
            let lease = pool.acquire_excluding(&only_first).unwrap();
            assert_eq!(lease.endpoint_id(), 0);
            pool.record_failure(lease, &fault());
        }

        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0].state, CircuitState::Open);
        assert_eq!(snapshot[1].state, CircuitState::Closed);

        let lease = pool.acquire().unwrap();
        assert_eq!(lease.endpoint_id(), 1);
    }

    #[tokio::test]
    async fn test_prefers_healthier_closed_endpoint() {
        let a = Arc::new(MockNode::new());
        let b = Arc::new(MockNode::new());
        let pool = pool_of(&[a, b], pool_config(5, Duration::from_secs(60)));

        let lease = pool.acquire().unwrap();
        pool.record_failure(lease, &fault());
        let lease = pool.acquire().unwrap();
        assert_eq!(lease.endpoint_id(), 1);
        pool.record_success(lease);

        let snapshot = pool.snapshot();
        assert!(snapshot[0].health < snapshot[1].health);
        assert_eq!(snapshot[0].state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_never_dispatches_to_open_endpoint() {
        let a = Arc::new(MockNode::new());
        let pool = pool_of(&[a], pool_config(1, Duration::from_secs(60)));

        let lease = pool.acquire().unwrap();
        pool.record_failure(lease, &fault());

        let err = pool.acquire().err().unwrap();
        assert!(matches!(err, EndpointError::CircuitOpen { .. }));
        assert!(pool.outage_duration().is_some());
    }

    #[tokio::test]
    async fn test_half_open_allows_one_probe() {
        let a = Arc::new(MockNode::new());
        let pool = pool_of(&[a], pool_config(1, Duration::ZERO));

        let lease = pool.acquire().unwrap();
        pool.record_failure(lease, &fault());

        let probe = pool.acquire().unwrap();
        assert!(probe.is_probe());
        assert!(pool.acquire().is_err());

        pool.record_success(probe);
        let lease = pool.acquire().unwrap();
        assert!(!lease.is_probe());
        assert!(pool.outage_duration().is_none());
    }

    #[tokio::test]
    async fn test_late_success_leaves_probe_in_charge() {
        let a = Arc::new(MockNode::new());
        let pool = pool_of(&[a], pool_config(1, Duration::ZERO));

        let early = pool.acquire().unwrap();
        let failing = pool.acquire().unwrap();
        pool.record_failure(failing, &fault());

        let probe = pool.acquire().unwrap();
        assert!(probe.is_probe());
        pool.record_success(early);
        assert_eq!(pool.snapshot()[0].state, CircuitState::HalfOpen);
        assert!(pool.acquire().is_err());

        pool.record_success(probe);
        assert_eq!(pool.snapshot()[0].state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_probe_lease_frees_slot() {
        let a = Arc::new(MockNode::new());
        let pool = pool_of(&[a], pool_config(1, Duration::ZERO));
        let lease = pool.acquire().unwrap();
        pool.record_failure(lease, &fault());

        let probe = pool.acquire().unwrap();
        drop(probe);
        assert!(pool.acquire().unwrap().is_probe());
    }

    #[tokio::test]
    async fn test_failover_moves_to_next_endpoint() {
        let a = Arc::new(MockNode::new());
        let b = Arc::new(MockNode::new());
        a.push_count(Err(fault()));
        b.push_count(Ok(7));
        let pool = pool_of(&[a.clone(), b.clone()], pool_config(5, Duration::from_secs(60)));

        let nonce = pool
            .call_with_failover(3, |node| async move { node.transaction_count("0xabc").await })
            .await
            .unwrap();
        assert_eq!(nonce, 7);
        assert_eq!(a.calls("transaction_count"), 1);
        assert_eq!(b.calls("transaction_count"), 1);
    }

    #[tokio::test]
    async fn test_node_answers_are_not_retried() {
        let a = Arc::new(MockNode::new());
        let b = Arc::new(MockNode::new());
        a.push_count(Err(NodeError::Rpc { code: -32000, message: "nonce too low".into() }));
        let pool = pool_of(&[a.clone(), b.clone()], pool_config(5, Duration::from_secs(60)));

        let err = pool
            .call_with_failover(3, |node| async move { node.transaction_count("0xabc").await })
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::Node(NodeError::Rpc { .. })));
        assert_eq!(b.calls("transaction_count"), 0);
        assert_eq!(pool.snapshot()[0].health, 1.0);
    }

    #[tokio::test]
    async fn test_failover_exhausts_attempts() {
        let a = Arc::new(MockNode::new());
        for _ in 0..3 {
            a.push_count(Err(fault()));
        }
        let pool = pool_of(&[a.clone()], pool_config(10, Duration::from_secs(60)));

        let err = pool
            .call_with_failover(3, |node| async move { node.transaction_count("0xabc").await })
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::Exhausted { attempts: 3, .. }));
        assert_eq!(a.calls("transaction_count"), 3);
    }

    #[tokio::test]
    async fn test_concurrent_recording_is_consistent() {
        let a = Arc::new(MockNode::new());
        let pool = Arc::new(pool_of(&[a], pool_config(1_000, Duration::from_secs(60))));

        let mut handles = Vec::new();
        for i in 0..32 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let lease = pool.acquire().unwrap();
                if i % 2 == 0 {
                    pool.record_success(lease);
                } else {
                    pool.record_failure(lease, &NodeError::RateLimited);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = &pool.snapshot()[0];
        assert_eq!(snapshot.total_requests, 32);
        assert_eq!(snapshot.total_failures, 16);
        assert!((0.0..=1.0).contains(&snapshot.health));
    }
}
