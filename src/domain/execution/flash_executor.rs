//! Flash-loan executor
//!
//! One executor per (chain, account). Every attempt holds the account's
//! in-flight slot from plan building to its terminal stage, and nothing is
//! submitted unless the same attempt simulated successfully.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::contract::{FlashLoanContract, TransactionSigner};
use super::execution_plan::{
    BorrowSide, ExecutionAttempt, ExecutionPlan, ExecutionResult, ExecutionStage, Outcome, Route,
};
use super::inflight::{InFlightPolicy, InFlightRegistry, PendingTx};
use super::route_blacklist::{BlacklistConfig, RouteBlacklist};
use crate::domain::arbitrage::Opportunity;
use crate::domain::endpoint::{CallRequest, EndpointPool, TxReceipt, UnsignedTransaction};
use crate::domain::gas::{FeeTier, GasOracle};
use crate::domain::telemetry::TelemetrySink;
use crate::shared::errors::{EndpointError, ExecutionError, NodeError};
use crate::shared::types::ChainId;
use crate::shared::utils::{generate_id, gwei_to_wei, keccak_hex};

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub in_flight_policy: InFlightPolicy,
    /// Plan lifetime from building to submission
    #[serde(with = "crate::shared::config::duration_ms")]
    pub plan_deadline: Duration,
    pub simulation_attempts: u32,
    pub max_submit_attempts: u32,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub receipt_poll_interval: Duration,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub receipt_timeout: Duration,
    /// Executions halt once the pool has had no closed endpoint this long
    #[serde(with = "crate::shared::config::duration_ms")]
    pub max_outage: Duration,
    pub gas_limit: u64,
    pub priority_fee_gwei: f64,
    pub blacklist: BlacklistConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            in_flight_policy: InFlightPolicy::Reject,
            plan_deadline: Duration::from_secs(30),
            simulation_attempts: 2,
            max_submit_attempts: 3,
            receipt_poll_interval: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(120),
            max_outage: Duration::from_secs(300),
            gas_limit: 600_000,
            priority_fee_gwei: 1.5,
            blacklist: BlacklistConfig::default(),
        }
    }
}

/// Collaborators of an executor
pub struct ExecutorParts {
    pub pool: Arc<EndpointPool>,
    pub gas: Arc<GasOracle>,
    pub contract: Arc<dyn FlashLoanContract>,
    pub signer: Arc<dyn TransactionSigner>,
    pub inflight: Arc<InFlightRegistry>,
    pub telemetry: Option<Arc<dyn TelemetrySink>>,
    pub shutdown: watch::Receiver<bool>,
}

/// Per-account trading limits copied from the chain thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionLimits {
    pub min_profit: f64,
    pub gas_price_cap_gwei: f64,
}

pub struct FlashExecutor {
    chain: ChainId,
    chain_id: u64,
    account: String,
    routes: Vec<Route>,
    limits: ExecutionLimits,
    config: ExecutorConfig,
    parts: ExecutorParts,
    blacklist: RouteBlacklist,
}

impl FlashExecutor {
    pub fn new(
        chain_id: u64,
        account: impl Into<String>,
        routes: Vec<Route>,
        limits: ExecutionLimits,
        config: ExecutorConfig,
        parts: ExecutorParts,
    ) -> Self {
        let blacklist = RouteBlacklist::new(config.blacklist.clone());
        Self {
            chain: parts.pool.chain().clone(),
            chain_id,
            account: account.into(),
            routes,
            limits,
            config,
            parts,
            blacklist,
        }
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn blacklist(&self) -> &RouteBlacklist {
        &self.blacklist
    }

    fn shutting_down(&self) -> bool {
        *self.parts.shutdown.borrow()
    }

    /// Why executions are currently halted, if they are. Evaluations go on.
    pub fn halt_reason(&self) -> Option<String> {
        if let Some(outage) = self.parts.pool.outage_duration() {
            if outage > self.config.max_outage {
                return Some(format!("no closed endpoint on {} for {:?}", self.chain, outage));
            }
        }
        let ids = self.routes.iter().map(|route| route.id.as_str());
        if self.blacklist.all_blacklisted(ids, Instant::now()) {
            return Some(format!("every route on {} is blacklisted", self.chain));
        }
        None
    }

    fn route_for(&self, opportunity: &Opportunity) -> Result<&Route, ExecutionError> {
        self.routes
            .iter()
            .find(|route| route.symbol == opportunity.symbol && route.direction == opportunity.direction)
            .ok_or_else(|| {
                ExecutionError::NoRoute(format!("{} {:?}", opportunity.symbol, opportunity.direction))
            })
    }

    fn build_plan(&self, opportunity: &Opportunity, route: &Route) -> ExecutionPlan {
        let borrow_price = match route.borrow_side {
            BorrowSide::Quote => 1.0,
            BorrowSide::Base => opportunity.dex_price,
        };
        let now = Utc::now();
        let deadline = chrono::Duration::from_std(self.config.plan_deadline)
            .map(|lifetime| now + lifetime)
            .unwrap_or(now);

        ExecutionPlan {
            id: generate_id(),
            chain: self.chain.clone(),
            account: self.account.clone(),
            route: route.clone(),
            borrow_asset: route.borrow_asset.clone(),
            borrow_amount: route.borrow_asset.to_base_units(opportunity.notional / borrow_price),
            borrow_price,
            min_profit: self.limits.min_profit,
            expected_profit: opportunity.net_profit,
            deadline,
            created_at: now,
        }
    }

    /// Take an executable opportunity through simulate, submit and confirm.
    ///
    /// Terminal outcomes (including a rejected simulation) come back as an
    /// `ExecutionResult`; an `Err` means the attempt stopped before reaching one.
    pub async fn execute(&self, opportunity: &Opportunity) -> Result<ExecutionResult, ExecutionError> {
        if self.shutting_down() {
            return Err(ExecutionError::ShuttingDown);
        }
        if let Some(reason) = self.halt_reason() {
            return Err(ExecutionError::Halted(reason));
        }
        if !opportunity.executable || opportunity.chain != self.chain {
            return Err(ExecutionError::NotExecutable);
        }
        let route = self.route_for(opportunity)?;
        if self.blacklist.is_blacklisted(&route.id, Instant::now()) {
            return Err(ExecutionError::RouteBlacklisted(route.id.clone()));
        }

        let _slot = self
            .parts
            .inflight
            .acquire(&self.chain, &self.account, self.config.in_flight_policy)
            .await?;
        self.settle_pending().await?;

        let plan = self.build_plan(opportunity, route);
        let mut attempt = ExecutionAttempt::new();
        attempt.plan_built(plan.id)?;
        info!(
            "Plan {} on {} via {}: borrow {} {}, expected profit {:.2}",
            plan.id, plan.chain, route.id, plan.borrow_amount, plan.borrow_asset.symbol, plan.expected_profit
        );

        let outcome = self.run(&plan, &mut attempt).await?;
        let result = attempt
            .finish(outcome, Utc::now())
            .ok_or_else(|| ExecutionError::InvalidTransition {
                from: "unfinished".to_string(),
                to: "result".to_string(),
            })?;

        info!("Plan {} finished as {:?}", result.plan_id, result.status);
        if let Some(sink) = &self.parts.telemetry {
            sink.record_execution(&result);
        }
        Ok(result)
    }

    /// Clear the account's unsettled submission once a receipt shows up or
    /// a mined transaction has used its nonce; until then the account stays busy.
    async fn settle_pending(&self) -> Result<(), ExecutionError> {
        let Some(pending) = self.parts.inflight.pending(&self.chain, &self.account) else {
            return Ok(());
        };

        let tx_hash = pending.tx_hash.as_str();
        let receipt = self
            .parts
            .pool
            .call(|node| async move { node.transaction_receipt(tx_hash).await })
            .await;
        if let Ok(Some(receipt)) = receipt {
            info!(
                "Earlier submission {} settled in block {} (success {})",
                tx_hash, receipt.block_number, receipt.success
            );
            if receipt.success {
                self.blacklist.record_confirmed(&pending.route_id);
            } else {
                self.blacklist.record_revert(&pending.route_id, Instant::now());
            }
            self.parts.inflight.clear_pending(&self.chain, &self.account);
            return Ok(());
        }

        let account = self.account.as_str();
        let mined = self
            .parts
            .pool
            .call(|node| async move { node.mined_transaction_count(account).await })
            .await;
        match mined {
            Ok(count) if count > pending.nonce => {
                info!("Nonce {} of {} used on-chain, releasing account", pending.nonce, self.account);
                self.parts.inflight.clear_pending(&self.chain, &self.account);
                Ok(())
            }
            _ => {
                debug!("Submission {} still unsettled", tx_hash);
                Err(ExecutionError::InFlightConflict {
                    chain: self.chain.clone(),
                    account: self.account.clone(),
                })
            }
        }
    }

    async fn run(&self, plan: &ExecutionPlan, attempt: &mut ExecutionAttempt) -> Result<Outcome, ExecutionError> {
        let mut outcome = Outcome {
            route_id: plan.route.id.clone(),
            ..Outcome::default()
        };
        let contract = &self.parts.contract;
        let calldata = contract.encode_execute(plan)?;

        // simulate
        let request = CallRequest::new(contract.address(), calldata.clone()).from_account(&plan.account);
        let simulated = self
            .parts
            .pool
            .call_with_failover(self.config.simulation_attempts, |node| {
                let request = &request;
                async move { node.call(request).await }
            })
            .await;

        let rejection = match simulated {
            Ok(output) => match contract.decode_profit(&output) {
                Ok(units) if plan.profit_in_quote(units) >= plan.min_profit => None,
                Ok(units) => Some(format!(
                    "simulated profit {:.4} below minimum {:.4}",
                    plan.profit_in_quote(units),
                    plan.min_profit
                )),
                Err(err) => Some(err.to_string()),
            },
            Err(EndpointError::Node(NodeError::Reverted(reason))) => Some(format!("reverted: {}", reason)),
            Err(err) => {
                warn!("Simulation of plan {} unreachable: {}", plan.id, err);
                attempt.advance(ExecutionStage::Failed)?;
                outcome.error = Some(err.to_string());
                return Ok(outcome);
            }
        };
        if let Some(reason) = rejection {
            info!("Plan {} rejected in simulation: {}", plan.id, reason);
            attempt.advance(ExecutionStage::SimulationRejected)?;
            self.blacklist
                .record_simulation_rejected(&plan.route.id, Instant::now());
            outcome.error = Some(reason);
            return Ok(outcome);
        }
        attempt.advance(ExecutionStage::Simulated)?;

        // conditions may have moved since simulation
        let fee = self.parts.gas.estimate(FeeTier::High).await;
        if !fee.is_fresh_at(Utc::now()) {
            return Err(ExecutionError::StaleFeeEstimate);
        }
        if fee.gwei > self.limits.gas_price_cap_gwei {
            return Err(ExecutionError::GasPriceExceeded {
                gwei: fee.gwei,
                cap: self.limits.gas_price_cap_gwei,
            });
        }

        let account = plan.account.as_str();
        let nonce = self
            .parts
            .pool
            .call_with_failover(self.config.simulation_attempts, |node| async move {
                node.transaction_count(account).await
            })
            .await?;

        let max_fee_per_gas = gwei_to_wei(fee.gwei);
        let tx = UnsignedTransaction {
            chain_id: self.chain_id,
            from: plan.account.clone(),
            to: contract.address().to_string(),
            data: calldata,
            nonce,
            gas_limit: self.config.gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas: gwei_to_wei(self.config.priority_fee_gwei).min(max_fee_per_gas),
        };
        let raw = self.parts.signer.sign(&tx).await?;
        let local_hash = keccak_hex(&raw);

        if self.shutting_down() {
            return Err(ExecutionError::ShuttingDown);
        }
        if plan.is_expired_at(Utc::now()) {
            return Err(ExecutionError::DeadlineExpired);
        }

        // submit the same signed bytes on each attempt
        attempt.advance(ExecutionStage::Submitted)?;
        outcome.tx_hash = Some(local_hash.clone());
        let submitted = self
            .parts
            .pool
            .call_with_failover(self.config.max_submit_attempts, |node| {
                let raw = raw.as_slice();
                let local_hash = local_hash.as_str();
                async move {
                    match node.send_raw_transaction(raw).await {
                        Err(NodeError::Rpc { message, .. }) if message.to_lowercase().contains("already known") => {
                            Ok(local_hash.to_string())
                        }
                        other => other,
                    }
                }
            })
            .await;

        let tx_hash = match submitted {
            Ok(hash) => hash,
            Err(err) => {
                error!("Submission of plan {} failed: {}", plan.id, err);
                attempt.advance(ExecutionStage::Failed)?;
                outcome.error = Some(err.to_string());
                return Ok(outcome);
            }
        };
        info!("Plan {} submitted as {}", plan.id, tx_hash);
        outcome.tx_hash = Some(tx_hash.clone());

        match self.wait_for_receipt(&tx_hash).await {
            Some(receipt) if receipt.success => {
                attempt.advance(ExecutionStage::Confirmed)?;
                self.blacklist.record_confirmed(&plan.route.id);
                outcome.gas_used = Some(receipt.gas_used);
                outcome.actual_profit = contract
                    .profit_from_logs(&receipt.logs)
                    .map(|units| plan.profit_in_quote(units));
            }
            Some(receipt) => {
                warn!("Plan {} reverted on-chain in block {}", plan.id, receipt.block_number);
                attempt.advance(ExecutionStage::Reverted)?;
                self.blacklist.record_revert(&plan.route.id, Instant::now());
                outcome.gas_used = Some(receipt.gas_used);
                outcome.error = Some("reverted on-chain".to_string());
            }
            None => {
                warn!("No receipt for {} within {:?}", tx_hash, self.config.receipt_timeout);
                attempt.advance(ExecutionStage::Failed)?;
                self.parts.inflight.record_pending(
                    &self.chain,
                    &self.account,
                    PendingTx {
                        tx_hash: tx_hash.clone(),
                        nonce,
                        route_id: plan.route.id.clone(),
                    },
                );
                outcome.error = Some("receipt timeout".to_string());
            }
        }
        Ok(outcome)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Option<TxReceipt> {
        let give_up = Instant::now() + self.config.receipt_timeout;
        loop {
            match self
                .parts
                .pool
                .call(|node| async move { node.transaction_receipt(tx_hash).await })
                .await
            {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => {}
                Err(err) => debug!("Receipt lookup for {} failed: {}", tx_hash, err),
            }
            if Instant::now() >= give_up {
                return None;
            }
            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arbitrage::{CostBreakdown, Direction};
    use crate::domain::endpoint::{ChainNode, CircuitBreakerConfig, FeeHistory, LogEntry, PoolConfig};
    use crate::domain::gas::GasOracleConfig;
    use crate::shared::types::{Pair, Token};
    use crate::testing::MockNode;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const GWEI: u128 = 1_000_000_000;

    /// Profit travels as a big-endian u128 in output and log data
    struct StubContract;

    impl FlashLoanContract for StubContract {
        fn address(&self) -> &str {
            "0xf1a5"
        }

        fn encode_execute(&self, plan: &ExecutionPlan) -> Result<Vec<u8>, ExecutionError> {
            Ok(plan.borrow_amount.to_be_bytes().to_vec())
        }

        fn decode_profit(&self, output: &[u8]) -> Result<u128, ExecutionError> {
            let bytes: [u8; 16] = output
                .try_into()
                .map_err(|_| ExecutionError::Contract("bad output".to_string()))?;
            Ok(u128::from_be_bytes(bytes))
        }

        fn profit_from_logs(&self, logs: &[LogEntry]) -> Option<u128> {
            logs.first().and_then(|log| self.decode_profit(&log.data).ok())
        }
    }

    #[derive(Default)]
    struct StubSigner {
        signed: Mutex<Vec<UnsignedTransaction>>,
    }

    #[async_trait]
    impl TransactionSigner for StubSigner {
        async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, ExecutionError> {
            self.signed.lock().push(tx.clone());
            Ok(vec![0x02, tx.nonce as u8])
        }
    }

    struct Harness {
        node: Arc<MockNode>,
        pool: Arc<EndpointPool>,
        signer: Arc<StubSigner>,
        inflight: Arc<InFlightRegistry>,
        shutdown: watch::Sender<bool>,
        executor: FlashExecutor,
    }

    fn usdc() -> Token {
        Token::new("USDC", "0xa0b8", 6)
    }

    fn routes() -> Vec<Route> {
        [Direction::SellDex, Direction::BuyDex]
            .into_iter()
            .map(|direction| Route {
                id: format!("eth-usdc-{:?}", direction).to_lowercase(),
                venue: "uniswap_v2".to_string(),
                symbol: Pair::new("ETH", "USDC"),
                direction,
                borrow_side: BorrowSide::Quote,
                borrow_asset: usdc(),
                path: vec!["0xa0b8".to_string(), "0xc02a".to_string(), "0xa0b8".to_string()],
            })
            .collect()
    }

    fn fee_history(base_gwei: u128) -> FeeHistory {
        FeeHistory {
            oldest_block: 1,
            base_fee_per_gas: vec![base_gwei * GWEI, base_gwei * GWEI],
            gas_used_ratio: vec![0.5],
            reward: vec![vec![GWEI, GWEI, 2 * GWEI]],
        }
    }

    fn harness(base_gwei: u128, config: ExecutorConfig) -> Harness {
        let node = Arc::new(MockNode::new());
        node.push_fee_history(Ok(fee_history(base_gwei)));
        let pool = Arc::new(EndpointPool::new(
            ChainId::new("ethereum"),
            vec![("mock".to_string(), node.clone() as Arc<dyn ChainNode>)],
            PoolConfig {
                breaker: CircuitBreakerConfig {
                    failure_threshold: 1,
                    jitter_ratio: 0.0,
                    ..CircuitBreakerConfig::default()
                },
                retry_base_delay: Duration::from_millis(1),
                retry_max_delay: Duration::from_millis(1),
            },
        ));
        let gas = Arc::new(GasOracle::new(
            Arc::clone(&pool),
            GasOracleConfig {
                refresh_interval: Duration::from_secs(3600),
                max_attempts: 1,
                ..GasOracleConfig::default()
            },
        ));
        let signer = Arc::new(StubSigner::default());
        let inflight = Arc::new(InFlightRegistry::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let executor = FlashExecutor::new(
            1,
            "0xacc0",
            routes(),
            ExecutionLimits {
                min_profit: 5.0,
                gas_price_cap_gwei: 50.0,
            },
            config,
            ExecutorParts {
                pool: Arc::clone(&pool),
                gas,
                contract: Arc::new(StubContract),
                signer: signer.clone(),
                inflight: Arc::clone(&inflight),
                telemetry: None,
                shutdown: shutdown_rx,
            },
        );
        Harness {
            node,
            pool,
            signer,
            inflight,
            shutdown,
            executor,
        }
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            receipt_poll_interval: Duration::from_millis(1),
            receipt_timeout: Duration::from_millis(50),
            simulation_attempts: 1,
            ..ExecutorConfig::default()
        }
    }

    fn opportunity() -> Opportunity {
        Opportunity {
            symbol: Pair::new("ETH", "USDC"),
            chain: ChainId::new("ethereum"),
            cex_price: 3050.0,
            dex_price: 3065.0,
            direction: Direction::SellDex,
            edge_bps: 49.18,
            notional: 18_300.0,
            gross_edge_value: 90.0,
            costs: CostBreakdown {
                gas_cost: 50.0,
                protocol_fee: 16.47,
                slippage_cost: 15.0,
            },
            net_profit: 8.53,
            gas_gwei: 20.0,
            executable: true,
            reason: None,
            confidence: None,
            fee_origin: None,
            timestamp: Utc::now(),
        }
    }

    /// 8 USDC in base units
    fn profit_output() -> Vec<u8> {
        8_000_000u128.to_be_bytes().to_vec()
    }

    fn receipt(success: bool) -> TxReceipt {
        TxReceipt {
            tx_hash: "0xfeed".to_string(),
            success,
            gas_used: 412_000,
            block_number: 19_000_000,
            logs: vec![LogEntry {
                address: "0xf1a5".to_string(),
                topics: vec![],
                data: 7_500_000u128.to_be_bytes().to_vec(),
            }],
        }
    }

    #[tokio::test]
    async fn test_confirmed_execution() {
        let h = harness(20, config());
        h.node.push_call(Ok(profit_output()));
        h.node.push_count(Ok(7));
        h.node.push_receipt(Ok(None));
        h.node.push_receipt(Ok(Some(receipt(true))));

        let result = h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(result.status, crate::domain::execution::ExecutionStatus::Confirmed);
        assert_eq!(result.tx_hash.as_deref(), Some("0xfeed"));
        assert_eq!(result.gas_used, Some(412_000));
        assert!((result.actual_profit.unwrap() - 7.5).abs() < 1e-9);
        assert_eq!(
            result.stages,
            vec![
                ExecutionStage::Idle,
                ExecutionStage::PlanBuilt,
                ExecutionStage::Simulated,
                ExecutionStage::Submitted,
                ExecutionStage::Confirmed,
            ]
        );

        let signed = h.signer.signed.lock().clone();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].nonce, 7);
        assert_eq!(signed[0].max_fee_per_gas, 22 * GWEI);
        assert_eq!(h.node.requests()[0].from.as_deref(), Some("0xacc0"));
        assert!(!h.inflight.is_busy(&ChainId::new("ethereum"), "0xacc0"));
    }

    #[tokio::test]
    async fn test_rejected_simulation_never_submits_and_blacklists() {
        let h = harness(20, config());
        for _ in 0..3 {
            h.node.push_call(Err(NodeError::Reverted("INSUFFICIENT_OUTPUT".to_string())));
            let result = h.executor.execute(&opportunity()).await.unwrap();
            assert_eq!(result.status, crate::domain::execution::ExecutionStatus::SimulationRejected);
            assert!(!result.was_submitted());
        }
        assert_eq!(h.node.calls("send_raw_transaction"), 0);
        assert!(h.node.sent().is_empty());

        let blocked = h.executor.execute(&opportunity()).await;
        assert!(matches!(blocked, Err(ExecutionError::RouteBlacklisted(_))));
        assert_eq!(h.node.calls("call"), 3);
    }

    #[tokio::test]
    async fn test_low_simulated_profit_is_rejected() {
        let h = harness(20, config());
        h.node.push_call(Ok(1_000_000u128.to_be_bytes().to_vec()));

        let result = h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(result.status, crate::domain::execution::ExecutionStatus::SimulationRejected);
        assert!(result.error.unwrap().contains("below minimum"));
        assert_eq!(h.node.calls("send_raw_transaction"), 0);
    }

    #[tokio::test]
    async fn test_unreachable_simulation_fails_without_submitting() {
        let h = harness(20, config());
        h.node.push_call(Err(NodeError::Transport("connection reset".to_string())));

        let result = h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(result.status, crate::domain::execution::ExecutionStatus::Failed);
        assert_eq!(h.node.calls("send_raw_transaction"), 0);
    }

    #[tokio::test]
    async fn test_second_plan_for_busy_account_is_rejected() {
        let h = harness(20, config());
        let _held = h
            .inflight
            .acquire(&ChainId::new("ethereum"), "0xACC0", InFlightPolicy::Reject)
            .await
            .unwrap();

        let err = h.executor.execute(&opportunity()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InFlightConflict { .. }));
        assert_eq!(h.node.calls("call"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_executions() {
        let h = harness(20, config());
        h.shutdown.send(true).unwrap();

        let err = h.executor.execute(&opportunity()).await.unwrap_err();
        assert_eq!(err, ExecutionError::ShuttingDown);
        assert_eq!(h.node.calls("call"), 0);
    }

    #[tokio::test]
    async fn test_gas_spike_after_simulation_holds_submission() {
        let h = harness(90, config());
        h.node.push_call(Ok(profit_output()));

        let err = h.executor.execute(&opportunity()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::GasPriceExceeded { .. }));
        assert_eq!(h.node.calls("call"), 1);
        assert_eq!(h.node.calls("send_raw_transaction"), 0);
    }

    #[tokio::test]
    async fn test_expired_plan_is_not_submitted() {
        let h = harness(
            20,
            ExecutorConfig {
                plan_deadline: Duration::ZERO,
                ..config()
            },
        );
        h.node.push_call(Ok(profit_output()));

        let err = h.executor.execute(&opportunity()).await.unwrap_err();
        assert_eq!(err, ExecutionError::DeadlineExpired);
        assert_eq!(h.node.calls("send_raw_transaction"), 0);
    }

    #[tokio::test]
    async fn test_repeated_reverts_blacklist_route() {
        let h = harness(20, config());
        for _ in 0..3 {
            h.node.push_call(Ok(profit_output()));
            h.node.push_receipt(Ok(Some(receipt(false))));
            let result = h.executor.execute(&opportunity()).await.unwrap();
            assert_eq!(result.status, crate::domain::execution::ExecutionStatus::Reverted);
        }
        assert_eq!(h.node.calls("send_raw_transaction"), 3);
        assert!(h.executor.blacklist().is_blacklisted("eth-usdc-selldex", Instant::now()));
        assert!(h.executor.halt_reason().is_none());
    }

    #[tokio::test]
    async fn test_already_known_counts_as_accepted() {
        let h = harness(20, config());
        h.node.push_call(Ok(profit_output()));
        h.node.push_count(Ok(3));
        h.node.push_send(Err(NodeError::Rpc {
            code: -32000,
            message: "already known".to_string(),
        }));
        h.node.push_receipt(Ok(Some(receipt(true))));

        let result = h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(result.status, crate::domain::execution::ExecutionStatus::Confirmed);
        assert_eq!(result.tx_hash, Some(keccak_hex(&[0x02, 3])));
    }

    #[tokio::test]
    async fn test_receipt_timeout_fails() {
        let h = harness(20, config());
        h.node.push_call(Ok(profit_output()));

        let result = h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(result.status, crate::domain::execution::ExecutionStatus::Failed);
        assert!(result.was_submitted());
        assert_eq!(result.error.as_deref(), Some("receipt timeout"));
    }

    #[tokio::test]
    async fn test_unsettled_submission_blocks_account() {
        let h = harness(20, config());
        h.node.push_count(Ok(4));
        h.node.push_call(Ok(profit_output()));
        let first = h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(first.error.as_deref(), Some("receipt timeout"));
        assert_eq!(h.node.calls("send_raw_transaction"), 1);

        // no receipt and nonce 4 not mined yet
        h.node.push_mined_count(Ok(4));
        let err = h.executor.execute(&opportunity()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InFlightConflict { .. }));
        assert_eq!(h.node.calls("send_raw_transaction"), 1);
        assert_eq!(h.node.calls("call"), 1);

        // the nonce is used on-chain, so the account is free again
        h.node.push_mined_count(Ok(5));
        h.node.push_call(Ok(profit_output()));
        h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(h.node.calls("send_raw_transaction"), 2);
    }

    #[tokio::test]
    async fn test_late_receipt_releases_account() {
        let h = harness(20, config());
        h.node.push_call(Ok(profit_output()));
        h.executor.execute(&opportunity()).await.unwrap();
        assert!(h.inflight.pending(&ChainId::new("ethereum"), "0xacc0").is_some());

        h.node.push_receipt(Ok(Some(receipt(true))));
        h.node.push_call(Ok(profit_output()));
        h.node.push_receipt(Ok(Some(receipt(true))));
        let second = h.executor.execute(&opportunity()).await.unwrap();
        assert_eq!(second.status, crate::domain::execution::ExecutionStatus::Confirmed);
        assert!(h.inflight.pending(&ChainId::new("ethereum"), "0xacc0").is_none());
        assert_eq!(h.node.calls("mined_transaction_count"), 0);
    }

    #[tokio::test]
    async fn test_pool_outage_halts_executions() {
        let h = harness(
            20,
            ExecutorConfig {
                max_outage: Duration::ZERO,
                ..config()
            },
        );
        let request = CallRequest::new("0x0", vec![]);
        let tripped = h
            .pool
            .call(|node| {
                let request = &request;
                async move { node.call(request).await }
            })
            .await;
        assert!(tripped.is_err());
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(h.executor.halt_reason().is_some());
        let err = h.executor.execute(&opportunity()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Halted(_)));
    }

    #[tokio::test]
    async fn test_not_executable_or_unrouted() {
        let h = harness(20, config());
        let mut rejected = opportunity();
        rejected.executable = false;
        assert_eq!(
            h.executor.execute(&rejected).await.unwrap_err(),
            ExecutionError::NotExecutable
        );

        let mut unknown = opportunity();
        unknown.symbol = Pair::new("BTC", "USDC");
        assert!(matches!(
            h.executor.execute(&unknown).await.unwrap_err(),
            ExecutionError::NoRoute(_)
        ));
    }
}
