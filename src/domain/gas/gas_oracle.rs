//! Gas/fee oracle
//!
//! Keeps one measured snapshot per chain. Refreshes are gated by
//! `refresh_interval`; a failed refresh keeps serving the last measured
//! snapshot under its original timestamp, and only a chain that was never
//! measured gets the configured default, flagged as such.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::endpoint::{EndpointPool, FeeHistory};
use crate::shared::errors::{EndpointError, NodeError};
use crate::shared::types::ChainId;
use crate::shared::utils::{is_fresh, median, wei_to_gwei};

/// Confidence tier of a fee estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeTier {
    Low,
    Median,
    High,
}

impl FeeTier {
    fn index(self) -> usize {
        match self {
            FeeTier::Low => 0,
            FeeTier::Median => 1,
            FeeTier::High => 2,
        }
    }
}

/// Where a fee estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeOrigin {
    Measured,
    Default,
}

/// Fee per gas for one tier, in gwei
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeEstimate {
    pub chain: ChainId,
    pub tier: FeeTier,
    pub gwei: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub ttl: Duration,
    pub origin: FeeOrigin,
}

impl FeeEstimate {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        is_fresh(self.timestamp, self.ttl, now)
    }

    pub fn is_default(&self) -> bool {
        self.origin == FeeOrigin::Default
    }
}

/// Conservative per-tier fallback, used only before the first measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultGwei {
    pub low: f64,
    pub median: f64,
    pub high: f64,
}

impl DefaultGwei {
    pub fn get(&self, tier: FeeTier) -> f64 {
        match tier {
            FeeTier::Low => self.low,
            FeeTier::Median => self.median,
            FeeTier::High => self.high,
        }
    }
}

impl Default for DefaultGwei {
    fn default() -> Self {
        Self {
            low: 30.0,
            median: 50.0,
            high: 100.0,
        }
    }
}

/// Oracle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasOracleConfig {
    #[serde(with = "crate::shared::config::duration_ms")]
    pub refresh_interval: Duration,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub estimate_ttl: Duration,
    pub history_blocks: u64,
    /// Reward percentiles for the low, median and high tiers
    pub reward_percentiles: [f64; 3],
    pub default_gwei: DefaultGwei,
    pub max_attempts: u32,
}

impl Default for GasOracleConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(12),
            estimate_ttl: Duration::from_secs(60),
            history_blocks: 10,
            reward_percentiles: [10.0, 50.0, 90.0],
            default_gwei: DefaultGwei::default(),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    gwei: [f64; 3],
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct OracleState {
    last_good: Option<Snapshot>,
    last_refresh: Option<Instant>,
}

/// Per-chain fee oracle
pub struct GasOracle {
    pool: Arc<EndpointPool>,
    config: GasOracleConfig,
    state: Mutex<OracleState>,
}

impl GasOracle {
    pub fn new(pool: Arc<EndpointPool>, config: GasOracleConfig) -> Self {
        Self {
            pool,
            config,
            state: Mutex::new(OracleState::default()),
        }
    }

    pub fn chain(&self) -> &ChainId {
        self.pool.chain()
    }

    /// Current estimate for `tier`, refreshing first when the refresh interval has passed
    pub async fn estimate(&self, tier: FeeTier) -> FeeEstimate {
        let mut state = self.state.lock().await;

        let due = state
            .last_refresh
            .map_or(true, |at| at.elapsed() >= self.config.refresh_interval);
        if due {
            state.last_refresh = Some(Instant::now());
            match self.fetch().await {
                Ok(snapshot) => {
                    debug!("Fee snapshot for {}: {:?} gwei", self.chain(), snapshot.gwei);
                    state.last_good = Some(snapshot);
                }
                Err(err) => warn!("Fee refresh for {} failed: {}", self.chain(), err),
            }
        }

        match &state.last_good {
            Some(snapshot) => FeeEstimate {
                chain: self.chain().clone(),
                tier,
                gwei: snapshot.gwei[tier.index()],
                timestamp: snapshot.timestamp,
                ttl: self.config.estimate_ttl,
                origin: FeeOrigin::Measured,
            },
            None => FeeEstimate {
                chain: self.chain().clone(),
                tier,
                gwei: self.config.default_gwei.get(tier),
                timestamp: Utc::now(),
                ttl: self.config.estimate_ttl,
                origin: FeeOrigin::Default,
            },
        }
    }

    async fn fetch(&self) -> Result<Snapshot, EndpointError> {
        let blocks = self.config.history_blocks;
        let percentiles = &self.config.reward_percentiles;
        let history = self
            .pool
            .call_with_failover(self.config.max_attempts, move |node| async move {
                node.fee_history(blocks, percentiles).await
            })
            .await?;

        let gwei = tier_prices(&history)?;
        Ok(Snapshot {
            gwei,
            timestamp: Utc::now(),
        })
    }
}

/// Next-block base fee plus the median reward of each percentile column
fn tier_prices(history: &FeeHistory) -> Result<[f64; 3], NodeError> {
    let base_fee = *history
        .base_fee_per_gas
        .last()
        .ok_or_else(|| NodeError::InvalidResponse("fee history has no base fee".to_string()))?;

    let mut tiers = [0.0; 3];
    for (column, tier) in tiers.iter_mut().enumerate() {
        let mut rewards: Vec<u128> = history
            .reward
            .iter()
            .filter_map(|block| block.get(column).copied())
            .collect();
        let tip = median(&mut rewards).unwrap_or(0);
        *tier = wei_to_gwei(base_fee.saturating_add(tip));
    }
    Ok(tiers)
}
