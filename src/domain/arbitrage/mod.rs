//! Arbitrage domain - turning a CEX price, a DEX quote and a fee estimate
//! into a go/no-go decision

mod confidence;
mod opportunity_evaluator;
mod profit_calculator;

pub use confidence::ConfidenceProvider;
pub use opportunity_evaluator::{evaluate, EvaluationInputs, EvaluationParams};
pub use profit_calculator::{
    calculate_edge_bps, calculate_gas_cost, calculate_gross_edge, calculate_protocol_fee,
    calculate_slippage_cost, CostBreakdown,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::gas::FeeOrigin;
use crate::shared::types::{ChainId, Pair};

/// Which venue is cheap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// DEX below CEX: buy on-chain
    BuyDex,
    /// DEX above CEX: sell on-chain
    SellDex,
}

impl Direction {
    pub fn between(cex_price: f64, dex_price: f64) -> Self {
        if dex_price < cex_price {
            Direction::BuyDex
        } else {
            Direction::SellDex
        }
    }
}

/// Why an opportunity is not executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingInput,
    Stale,
    InvalidPrice,
    Liquidity,
    DefaultFee,
    BelowMinProfit,
    BelowMinEdge,
    GasPriceCap,
    LowConfidence,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RejectReason::MissingInput => "missing_input",
            RejectReason::Stale => "stale",
            RejectReason::InvalidPrice => "invalid_price",
            RejectReason::Liquidity => "liquidity",
            RejectReason::DefaultFee => "default_fee",
            RejectReason::BelowMinProfit => "below_min_profit",
            RejectReason::BelowMinEdge => "below_min_edge",
            RejectReason::GasPriceCap => "gas_price_cap",
            RejectReason::LowConfidence => "low_confidence",
        };
        f.write_str(code)
    }
}

/// Outcome of one evaluation. Built once, never mutated.
///
/// Prices and costs are zero when the evaluation stopped at an input check;
/// `reason` says which.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    pub symbol: Pair,
    pub chain: ChainId,
    pub cex_price: f64,
    pub dex_price: f64,
    pub direction: Direction,
    pub edge_bps: f64,
    pub notional: f64,
    pub gross_edge_value: f64,
    pub costs: CostBreakdown,
    pub net_profit: f64,
    pub gas_gwei: f64,
    pub executable: bool,
    pub reason: Option<RejectReason>,
    pub confidence: Option<f64>,
    pub fee_origin: Option<FeeOrigin>,
    pub timestamp: DateTime<Utc>,
}
