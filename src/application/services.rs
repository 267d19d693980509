//! Application services - wiring configuration into the domain components

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use super::scanner::{ScanTarget, Scanner};
use crate::domain::arbitrage::{ConfidenceProvider, EvaluationParams};
use crate::domain::dex::{DexMarket, DexQuoteProvider};
use crate::domain::endpoint::{ChainNode, EndpointPool, EndpointRegistry, PoolConfig};
use crate::domain::execution::{
    BorrowSide, ExecutionLimits, ExecutorParts, FlashExecutor, InFlightRegistry, Route,
};
use crate::domain::gas::GasOracle;
use crate::domain::price::{PriceAggregator, SourceSettings, SymbolMap};
use crate::domain::telemetry::TelemetrySink;
use crate::infrastructure::blockchain::{DexAdapterFactory, FlashArbContract, JsonRpcNode, RemoteSigner};
use crate::infrastructure::price_sources::build_price_source;
use crate::infrastructure::{HttpConfidenceProvider, JsonLinesSink, TracingSink};
use crate::shared::config::{AppConfig, ChainConfig, RouteConfig, ScannerConfig, TelemetryKind};
use crate::shared::errors::AppError;
use crate::shared::types::{ChainId, Pair};

const RPC_TIMEOUT: Duration = Duration::from_secs(10);
const SIGNER_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything scanned and executed on one chain
pub struct ChainServices {
    pub chain: ChainId,
    pub native_pair: Pair,
    pub thresholds: EvaluationParams,
    pub markets: Vec<ScanTarget>,
    pub pool: Arc<EndpointPool>,
    pub gas: Arc<GasOracle>,
    pub dex: Arc<DexQuoteProvider>,
    pub executor: Option<Arc<FlashExecutor>>,
}

/// The assembled application
pub struct AppServices {
    pub scanner_config: ScannerConfig,
    pub registry: EndpointRegistry,
    pub prices: Arc<PriceAggregator>,
    pub chains: Vec<Arc<ChainServices>>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub confidence: Option<Arc<dyn ConfidenceProvider>>,
}

impl AppServices {
    /// Build every component from a validated configuration
    pub fn build(config: &AppConfig, shutdown: watch::Receiver<bool>) -> Result<Self, AppError> {
        let telemetry: Arc<dyn TelemetrySink> = match (&config.telemetry.sink, &config.telemetry.path) {
            (TelemetryKind::JsonLines, Some(path)) => Arc::new(JsonLinesSink::open(path)?),
            (TelemetryKind::JsonLines, None) => {
                return Err(AppError::Config("telemetry.path is required for json_lines".to_string()))
            }
            (TelemetryKind::Tracing, _) => Arc::new(TracingSink),
        };

        let prices = Arc::new(build_aggregator(config)?);

        let confidence = match &config.confidence {
            Some(c) => Some(Arc::new(HttpConfidenceProvider::new(&c.url, c.timeout)?) as Arc<dyn ConfidenceProvider>),
            None => None,
        };

        let inflight = Arc::new(InFlightRegistry::new());
        let mut registry = EndpointRegistry::new();
        let mut chains = Vec::with_capacity(config.chains.len());

        for chain in &config.chains {
            let nodes = chain
                .endpoints
                .iter()
                .map(|url| {
                    JsonRpcNode::new(url.as_str(), RPC_TIMEOUT)
                        .map(|node| (url.clone(), Arc::new(node) as Arc<dyn ChainNode>))
                        .map_err(|e| AppError::Config(format!("chain {}: endpoint {}: {}", chain.name, url, e)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let pool_config = PoolConfig {
                breaker: config.circuit_breaker.clone(),
                ..PoolConfig::default()
            };
            let pool = registry.insert(EndpointPool::new(chain.name.clone(), nodes, pool_config));
            let gas = Arc::new(GasOracle::new(Arc::clone(&pool), config.gas.clone()));

            let mut dex = DexQuoteProvider::new(Arc::clone(&pool), chain.dex_quote_ttl, chain.max_attempts);
            let mut markets = Vec::with_capacity(chain.markets.len());
            for market in &chain.markets {
                dex.add_market(DexMarket {
                    pair: market.pair.clone(),
                    base: chain.token(&market.base_token)?.clone(),
                    quote: chain.token(&market.quote_token)?.clone(),
                    adapter: DexAdapterFactory::create_adapter(&market.venue),
                });
                markets.push(ScanTarget {
                    pair: market.pair.clone(),
                    notional: market.notional,
                });
            }

            let executor = match &chain.execution {
                Some(execution) if !chain.routes.is_empty() => {
                    let routes = chain
                        .routes
                        .iter()
                        .map(|route| build_route(chain, route))
                        .collect::<Result<Vec<_>, _>>()?;
                    let parts = ExecutorParts {
                        pool: Arc::clone(&pool),
                        gas: Arc::clone(&gas),
                        contract: Arc::new(FlashArbContract::new(&execution.contract)?),
                        signer: Arc::new(RemoteSigner::new(&execution.signer_url, SIGNER_TIMEOUT)?),
                        inflight: Arc::clone(&inflight),
                        telemetry: Some(Arc::clone(&telemetry)),
                        shutdown: shutdown.clone(),
                    };
                    let limits = ExecutionLimits {
                        min_profit: chain.thresholds.min_profit,
                        gas_price_cap_gwei: chain.thresholds.gas_price_cap_gwei,
                    };
                    Some(Arc::new(FlashExecutor::new(
                        chain.chain_id,
                        chain.account.as_str(),
                        routes,
                        limits,
                        execution.executor.clone(),
                        parts,
                    )))
                }
                _ => None,
            };

            info!(
                "Chain {}: {} endpoint(s), {} market(s), {} route(s)",
                chain.name,
                pool.len(),
                markets.len(),
                if executor.is_some() { chain.routes.len() } else { 0 }
            );
            chains.push(Arc::new(ChainServices {
                chain: chain.name.clone(),
                native_pair: chain.native_pair.clone(),
                thresholds: chain.thresholds.clone(),
                markets,
                pool,
                gas,
                dex: Arc::new(dex),
                executor,
            }));
        }

        Ok(Self {
            scanner_config: config.scanner.clone(),
            registry,
            prices,
            chains,
            telemetry,
            confidence,
        })
    }

    pub fn scanner(&self, shutdown: watch::Receiver<bool>) -> Scanner {
        Scanner::new(
            self.scanner_config.clone(),
            Arc::clone(&self.prices),
            self.chains.clone(),
            Arc::clone(&self.telemetry),
            self.confidence.clone(),
            shutdown,
        )
    }
}

fn build_aggregator(config: &AppConfig) -> Result<PriceAggregator, AppError> {
    let mut symbols = SymbolMap::new();
    for source in &config.price_sources {
        for (pair, ticker) in &source.symbols {
            let pair: Pair = pair
                .parse()
                .map_err(|e: String| AppError::Config(format!("price source {}: {}", source.id, e)))?;
            symbols.insert(source.id.as_str(), pair, ticker.as_str());
        }
    }

    let mut aggregator = PriceAggregator::new(symbols);
    for source in &config.price_sources {
        let settings = SourceSettings {
            priority: source.priority,
            requests_per_minute: source.requests_per_minute,
            cache_ttl: source.cache_ttl,
            rate_limit_backoff: source.rate_limit_backoff,
        };
        aggregator.add_source(build_price_source(source)?, settings);
    }
    for synthetic in &config.synthetic {
        aggregator.add_cross_route(synthetic.target.clone(), synthetic.legs.clone())?;
    }
    Ok(aggregator)
}

/// Resolve a configured route's token symbols into addresses
fn build_route(chain: &ChainConfig, route: &RouteConfig) -> Result<Route, AppError> {
    let market = chain
        .markets
        .iter()
        .find(|market| market.pair == route.symbol)
        .ok_or_else(|| AppError::Config(format!("chain {}: route {} has no market", chain.name, route.id)))?;
    let borrow_symbol = match route.borrow {
        BorrowSide::Base => &market.base_token,
        BorrowSide::Quote => &market.quote_token,
    };
    let path = route
        .path
        .iter()
        .map(|symbol| chain.token(symbol).map(|token| token.address.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Route {
        id: route.id.clone(),
        venue: route.venue.clone(),
        symbol: route.symbol.clone(),
        direction: route.direction,
        borrow_side: route.borrow,
        borrow_asset: chain.token(borrow_symbol)?.clone(),
        path,
    })
}
