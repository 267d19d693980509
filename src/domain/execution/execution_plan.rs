//! Execution plans, attempts and their stage machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::arbitrage::Direction;
use crate::shared::errors::ExecutionError;
use crate::shared::types::{ChainId, Pair, Token};

/// Stage of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Idle,
    PlanBuilt,
    Simulated,
    Submitted,
    Confirmed,
    Reverted,
    Failed,
    SimulationRejected,
}

impl ExecutionStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStage::Confirmed
                | ExecutionStage::Reverted
                | ExecutionStage::Failed
                | ExecutionStage::SimulationRejected
        )
    }

    /// Legal edges of the stage machine
    pub fn can_advance_to(self, next: ExecutionStage) -> bool {
        use ExecutionStage::*;
        matches!(
            (self, next),
            (Idle, PlanBuilt)
                | (PlanBuilt, Simulated)
                | (PlanBuilt, SimulationRejected)
                | (PlanBuilt, Failed)
                | (Simulated, Submitted)
                | (Simulated, Failed)
                | (Submitted, Confirmed)
                | (Submitted, Reverted)
                | (Submitted, Failed)
        )
    }

    pub fn status(self) -> Option<ExecutionStatus> {
        match self {
            ExecutionStage::Confirmed => Some(ExecutionStatus::Confirmed),
            ExecutionStage::Reverted => Some(ExecutionStatus::Reverted),
            ExecutionStage::Failed => Some(ExecutionStatus::Failed),
            ExecutionStage::SimulationRejected => Some(ExecutionStatus::SimulationRejected),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Terminal outcome of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Confirmed,
    Reverted,
    Failed,
    SimulationRejected,
}

/// Which side of the pair the flash loan borrows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorrowSide {
    Base,
    Quote,
}

/// A configured on-chain path for one direction of one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub id: String,
    pub venue: String,
    pub symbol: Pair,
    pub direction: Direction,
    pub borrow_side: BorrowSide,
    /// Asset borrowed from the flash-loan provider
    pub borrow_asset: Token,
    /// Token addresses swapped through, starting and ending at the borrow asset
    pub path: Vec<String>,
}

/// Everything needed to simulate and submit one flash loan. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    pub chain: ChainId,
    pub account: String,
    pub route: Route,
    pub borrow_asset: Token,
    /// In base units of the borrow asset
    pub borrow_amount: u128,
    /// Quote currency per whole borrow-asset unit, for profit conversion
    pub borrow_price: f64,
    /// Quote currency
    pub min_profit: f64,
    pub expected_profit: f64,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Minimum profit in borrow-asset base units, as passed to the contract
    pub fn min_profit_units(&self) -> u128 {
        if self.borrow_price <= 0.0 {
            return 0;
        }
        self.borrow_asset.to_base_units(self.min_profit / self.borrow_price)
    }

    /// Convert a profit in borrow-asset base units into quote currency
    pub fn profit_in_quote(&self, units: u128) -> f64 {
        self.borrow_asset.from_base_units(units) * self.borrow_price
    }
}

/// Stage tracker for one attempt. Only legal transitions are accepted.
#[derive(Debug, Clone)]
pub struct ExecutionAttempt {
    plan_id: Option<Uuid>,
    stage: ExecutionStage,
    history: Vec<ExecutionStage>,
}

impl ExecutionAttempt {
    pub fn new() -> Self {
        Self {
            plan_id: None,
            stage: ExecutionStage::Idle,
            history: vec![ExecutionStage::Idle],
        }
    }

    pub fn stage(&self) -> ExecutionStage {
        self.stage
    }

    pub fn history(&self) -> &[ExecutionStage] {
        &self.history
    }

    pub fn has_reached(&self, stage: ExecutionStage) -> bool {
        self.history.contains(&stage)
    }

    pub fn plan_built(&mut self, plan_id: Uuid) -> Result<(), ExecutionError> {
        self.advance(ExecutionStage::PlanBuilt)?;
        self.plan_id = Some(plan_id);
        Ok(())
    }

    pub fn advance(&mut self, next: ExecutionStage) -> Result<(), ExecutionError> {
        if !self.stage.can_advance_to(next) {
            return Err(ExecutionError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        self.history.push(next);
        Ok(())
    }

    /// Close a terminal attempt into its result
    pub fn finish(self, outcome: Outcome, completed_at: DateTime<Utc>) -> Option<ExecutionResult> {
        let status = self.stage.status()?;
        Some(ExecutionResult {
            plan_id: self.plan_id?,
            route_id: outcome.route_id,
            status,
            actual_profit: outcome.actual_profit,
            gas_used: outcome.gas_used,
            tx_hash: outcome.tx_hash,
            stages: self.history,
            error: outcome.error,
            completed_at,
        })
    }
}

impl Default for ExecutionAttempt {
    fn default() -> Self {
        Self::new()
    }
}

/// What is known about an attempt when it ends
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub route_id: String,
    pub actual_profit: Option<f64>,
    pub gas_used: Option<u64>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

/// Record of a finished attempt. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub plan_id: Uuid,
    pub route_id: String,
    pub status: ExecutionStatus,
    /// Quote currency, when confirmed and decodable
    pub actual_profit: Option<f64>,
    pub gas_used: Option<u64>,
    pub tx_hash: Option<String>,
    pub stages: Vec<ExecutionStage>,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn was_submitted(&self) -> bool {
        self.stages.contains(&ExecutionStage::Submitted)
    }
}
