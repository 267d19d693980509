//! Scan loop: price every configured market, evaluate the gap and hand
//! executable opportunities to the chain's executor.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::services::ChainServices;
use crate::domain::arbitrage::{evaluate, ConfidenceProvider, EvaluationInputs, Opportunity};
use crate::domain::execution::FlashExecutor;
use crate::domain::gas::FeeTier;
use crate::domain::price::PriceAggregator;
use crate::domain::telemetry::TelemetrySink;
use crate::shared::config::ScannerConfig;
use crate::shared::errors::ErrorKind;
use crate::shared::types::Pair;

/// One market scanned every cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTarget {
    pub pair: Pair,
    /// Quote-currency amount the trade is sized at
    pub notional: f64,
}

fn logged<T, E: Display>(what: &str, pair: &Pair, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("No {} for {}: {}", what, pair, e);
            None
        }
    }
}

pub struct Scanner {
    config: ScannerConfig,
    prices: Arc<PriceAggregator>,
    chains: Vec<Arc<ChainServices>>,
    telemetry: Arc<dyn TelemetrySink>,
    confidence: Option<Arc<dyn ConfidenceProvider>>,
    shutdown: watch::Receiver<bool>,
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        prices: Arc<PriceAggregator>,
        chains: Vec<Arc<ChainServices>>,
        telemetry: Arc<dyn TelemetrySink>,
        confidence: Option<Arc<dyn ConfidenceProvider>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            prices,
            chains,
            telemetry,
            confidence,
            shutdown,
        }
    }

    /// Scan every `interval` until shutdown is signalled
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.clone();
        info!(
            "Scanner started: {} chain(s), every {:?}, execution {}",
            self.chains.len(),
            self.config.interval,
            if self.config.execution_enabled { "enabled" } else { "disabled" }
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let started = Instant::now();
            let opportunities = self.scan_once().await;
            let executable = opportunities.iter().filter(|o| o.executable).count();
            debug!(
                "Cycle scanned {} market(s), {} executable, in {:?}",
                opportunities.len(),
                executable,
                started.elapsed()
            );

            let wait = self.config.interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Scanner stopped");
    }

    /// One cycle over every (chain, market), at most `max_concurrent_scans` at a time
    pub async fn scan_once(&self) -> Vec<Opportunity> {
        let targets: Vec<(Arc<ChainServices>, ScanTarget)> = self
            .chains
            .iter()
            .flat_map(|chain| {
                chain
                    .markets
                    .iter()
                    .map(move |target| (Arc::clone(chain), target.clone()))
            })
            .collect();

        let results = Mutex::new(Vec::with_capacity(targets.len()));
        stream::iter(targets)
            .for_each_concurrent(self.config.max_concurrent_scans, |(chain, target)| {
                let results = &results;
                async move {
                    let opportunity = self.scan_target(&chain, &target).await;
                    results.lock().push(opportunity);
                }
            })
            .await;
        results.into_inner()
    }

    async fn scan_target(&self, chain: &ChainServices, target: &ScanTarget) -> Opportunity {
        let pair = &target.pair;
        let (cex, dex, fee) = tokio::join!(
            self.prices.get_price(pair),
            chain.dex.get_quote(pair, target.notional),
            chain.gas.estimate(FeeTier::Median),
        );
        let cex = logged("CEX price", pair, cex);
        let dex = logged("DEX quote", pair, dex);

        let native_price = if chain.native_pair == *pair {
            cex.as_ref().map(|quote| quote.price)
        } else {
            logged("native price", &chain.native_pair, self.prices.get_price(&chain.native_pair).await)
                .map(|quote| quote.price)
        };

        let confidence = match (&self.confidence, &cex, &dex) {
            (Some(provider), Some(cex), Some(dex)) => {
                provider.confidence(pair, &chain.chain, cex.price, dex.mid()).await
            }
            _ => None,
        };

        let inputs = EvaluationInputs {
            symbol: pair.clone(),
            chain: chain.chain.clone(),
            cex,
            dex,
            fee: Some(fee),
            native_price,
            notional: target.notional,
            confidence,
        };
        let opportunity = evaluate(&inputs, &chain.thresholds, Utc::now());
        self.telemetry.record_opportunity(&opportunity);

        if opportunity.executable {
            info!(
                "Opportunity {} on {}: {:?}, edge {:.1} bps, net {:.2}",
                opportunity.symbol, opportunity.chain, opportunity.direction, opportunity.edge_bps, opportunity.net_profit
            );
            if self.config.execution_enabled {
                if let Some(executor) = &chain.executor {
                    Self::execute(executor, &opportunity).await;
                }
            }
        } else {
            debug!(
                "{} on {} not executable: {:?}",
                opportunity.symbol, opportunity.chain, opportunity.reason
            );
        }
        opportunity
    }

    async fn execute(executor: &FlashExecutor, opportunity: &Opportunity) {
        match executor.execute(opportunity).await {
            Ok(result) => info!(
                "Execution {} via {}: {:?}, profit {:?}",
                result.plan_id, result.route_id, result.status, result.actual_profit
            ),
            Err(e) => match e.kind() {
                ErrorKind::InFlightConflict => debug!("Skipped {}: {}", opportunity.symbol, e),
                ErrorKind::Fatal => warn!("Execution of {} stopped: {}", opportunity.symbol, e),
                _ => info!("Execution of {} aborted: {}", opportunity.symbol, e),
            },
        }
    }
}
