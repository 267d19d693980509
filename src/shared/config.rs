//! Configuration loading and validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};

use crate::domain::arbitrage::{Direction, EvaluationParams};
use crate::domain::endpoint::CircuitBreakerConfig;
use crate::domain::execution::{BorrowSide, ExecutorConfig};
use crate::domain::gas::GasOracleConfig;
use crate::domain::price::CrossRoute;
use crate::shared::errors::AppError;
use crate::shared::types::{ChainId, Pair, Token};

/// Durations are written as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_concurrent() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_interval", with = "duration_ms")]
    pub interval: Duration,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_scans: usize,
    /// Hand executable opportunities to the executors
    #[serde(default)]
    pub execution_enabled: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_concurrent_scans: default_max_concurrent(),
            execution_enabled: false,
        }
    }
}

/// Supported centralized venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    Binance,
    Coinbase,
    Kraken,
}

fn default_rpm() -> u32 {
    600
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSourceConfig {
    pub id: String,
    pub kind: PriceSourceKind,
    /// Overrides the venue's public API root
    pub base_url: Option<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_cache_ttl", with = "duration_ms")]
    pub cache_ttl: Duration,
    #[serde(default = "default_backoff", with = "duration_ms")]
    pub rate_limit_backoff: Duration,
    #[serde(default = "default_timeout", with = "duration_ms")]
    pub timeout: Duration,
    /// "BASE/QUOTE" -> venue ticker
    #[serde(default)]
    pub symbols: BTreeMap<String, String>,
}

/// A pair priced as the product of other pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticPairConfig {
    pub target: Pair,
    pub legs: Vec<Pair>,
}

/// On-chain venue a market is quoted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DexVenueConfig {
    UniswapV2 {
        /// Pair contract address
        pool: String,
        #[serde(default = "default_fee_bps")]
        fee_bps: u32,
    },
}

fn default_fee_bps() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// CEX pair this market is compared against
    pub pair: Pair,
    /// Token symbols from the chain's token list
    pub base_token: String,
    pub quote_token: String,
    pub venue: DexVenueConfig,
    /// Trade size in quote currency
    pub notional: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub id: String,
    pub symbol: Pair,
    pub direction: Direction,
    pub borrow: BorrowSide,
    pub venue: String,
    /// Token symbols swapped through
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExecutionConfig {
    /// Deployed flash-loan contract
    pub contract: String,
    /// External signer speaking eth_signTransaction
    pub signer_url: String,
    #[serde(flatten)]
    pub executor: ExecutorConfig,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_quote_ttl() -> Duration {
    Duration::from_secs(12)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: ChainId,
    /// EIP-155 chain id
    pub chain_id: u64,
    /// Executing account
    pub account: String,
    pub endpoints: Vec<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pair pricing the native gas asset in quote currency
    pub native_pair: Pair,
    #[serde(default = "default_quote_ttl", with = "duration_ms")]
    pub dex_quote_ttl: Duration,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub thresholds: EvaluationParams,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
    pub execution: Option<ChainExecutionConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl ChainConfig {
    pub fn token(&self, symbol: &str) -> Result<&Token, AppError> {
        self.tokens
            .iter()
            .find(|token| token.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| AppError::Config(format!("chain {}: unknown token {}", self.name, symbol)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    #[default]
    Tracing,
    JsonLines,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub sink: TelemetryKind,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    pub url: String,
    #[serde(default = "default_timeout", with = "duration_ms")]
    pub timeout: Duration,
}

/// Whole application configuration (Config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub gas: GasOracleConfig,
    #[serde(default)]
    pub price_sources: Vec<PriceSourceConfig>,
    #[serde(default)]
    pub synthetic: Vec<SyntheticPairConfig>,
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub confidence: Option<ConfidenceConfig>,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let fail = |msg: String| Err(AppError::Config(msg));

        if self.scanner.max_concurrent_scans == 0 {
            return fail("scanner.max_concurrent_scans must be positive".to_string());
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return fail("circuit_breaker.failure_threshold must be positive".to_string());
        }
        if self.chains.is_empty() {
            return fail("at least one [[chains]] entry is required".to_string());
        }

        for source in &self.price_sources {
            for pair in source.symbols.keys() {
                if pair.parse::<Pair>().is_err() {
                    return fail(format!("price source {}: bad pair '{}'", source.id, pair));
                }
            }
        }

        for synthetic in &self.synthetic {
            CrossRoute::new(synthetic.target.clone(), synthetic.legs.clone())
                .map_err(|e| AppError::Config(e.to_string()))?;
        }

        for chain in &self.chains {
            if chain.endpoints.is_empty() {
                return fail(format!("chain {}: no endpoints", chain.name));
            }
            let t = &chain.thresholds;
            if t.min_profit < 0.0 || t.min_edge_bps < 0.0 || t.slippage_bps < 0.0 || t.protocol_fee_rate < 0.0 {
                return fail(format!("chain {}: thresholds must be non-negative", chain.name));
            }
            for market in &chain.markets {
                chain.token(&market.base_token)?;
                chain.token(&market.quote_token)?;
                if market.notional <= 0.0 {
                    return fail(format!("chain {}: market {} needs a positive notional", chain.name, market.pair));
                }
            }
            for route in &chain.routes {
                if route.path.len() < 2 {
                    return fail(format!("chain {}: route {} path is too short", chain.name, route.id));
                }
                for symbol in &route.path {
                    chain.token(symbol)?;
                }
                if !chain.markets.iter().any(|market| market.pair == route.symbol) {
                    return fail(format!("chain {}: route {} has no market", chain.name, route.id));
                }
            }
            if !chain.routes.is_empty() && chain.execution.is_none() {
                return fail(format!("chain {}: routes need an [chains.execution] section", chain.name));
            }
        }

        if self.telemetry.sink == TelemetryKind::JsonLines && self.telemetry.path.is_none() {
            return fail("telemetry.path is required for the json_lines sink".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = include_str!("../../Config.toml");

    #[test]
    fn test_sample_config_parses() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert!(!config.chains.is_empty());
        assert!(config.price_sources.len() >= 2);

        let chain = &config.chains[0];
        assert_eq!(chain.name, ChainId::new("ethereum"));
        assert!(chain.execution.is_some());
        assert_eq!(chain.thresholds.gas_units, 400_000);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scanner.interval, Duration::from_millis(2000));
        assert!(AppConfig::from_file("/nonexistent/Config.toml").is_err());
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = AppConfig::from_toml(
            r#"
            [[chains]]
            name = "ethereum"
            chain_id = 1
            account = "0x0000000000000000000000000000000000000001"
            endpoints = ["http://localhost:8545"]
            native_pair = "ETH/USD"
            "#,
        )
        .unwrap();
        assert_eq!(config.circuit_breaker, CircuitBreakerConfig::default());
        assert_eq!(config.gas.refresh_interval, Duration::from_secs(12));
        assert_eq!(config.scanner.max_concurrent_scans, 4);
        assert_eq!(config.telemetry.sink, TelemetryKind::Tracing);
    }

    #[test]
    fn test_validation_errors() {
        let no_endpoints = r#"
            [[chains]]
            name = "ethereum"
            chain_id = 1
            account = "0x01"
            endpoints = []
            native_pair = "ETH/USD"
        "#;
        assert!(matches!(AppConfig::from_toml(no_endpoints), Err(AppError::Config(_))));

        let self_cross = r#"
            [[synthetic]]
            target = "ETH/EUR"
            legs = ["EUR/ETH"]

            [[chains]]
            name = "ethereum"
            chain_id = 1
            account = "0x01"
            endpoints = ["http://localhost:8545"]
            native_pair = "ETH/USD"
        "#;
        assert!(AppConfig::from_toml(self_cross).is_err());

        let unknown_token = r#"
            [[chains]]
            name = "ethereum"
            chain_id = 1
            account = "0x01"
            endpoints = ["http://localhost:8545"]
            native_pair = "ETH/USD"

            [[chains.markets]]
            pair = "ETH/USDC"
            base_token = "WETH"
            quote_token = "USDC"
            notional = 1000.0
            venue = { kind = "uniswap_v2", pool = "0xb4e1" }
        "#;
        assert!(AppConfig::from_toml(unknown_token).is_err());
    }
}
