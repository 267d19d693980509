//! Opportunity evaluator
//!
//! A pure function of its inputs and the `now` it is handed. Checks run in a
//! fixed order and the first failing one names the reject reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profit_calculator::{
    calculate_edge_bps, calculate_gas_cost, calculate_gross_edge, calculate_protocol_fee,
    calculate_slippage_cost, CostBreakdown,
};
use super::{Direction, Opportunity, RejectReason};
use crate::domain::dex::DexQuote;
use crate::domain::gas::{FeeEstimate, FeeOrigin};
use crate::domain::price::PriceQuote;
use crate::shared::types::{ChainId, Pair};

/// Everything observed for one (symbol, chain) in a scan
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationInputs {
    pub symbol: Pair,
    pub chain: ChainId,
    pub cex: Option<PriceQuote>,
    pub dex: Option<DexQuote>,
    pub fee: Option<FeeEstimate>,
    /// Native asset price in quote currency, used to price gas
    pub native_price: Option<f64>,
    pub notional: f64,
    pub confidence: Option<f64>,
}

/// Per-chain thresholds and cost assumptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationParams {
    pub min_edge_bps: f64,
    /// Quote currency
    pub min_profit: f64,
    pub gas_price_cap_gwei: f64,
    /// Drift allowance between quote and inclusion. Pool fee and impact are
    /// already in the DEX bid and ask.
    pub slippage_bps: f64,
    /// Flash-loan fee as a fraction of notional
    pub protocol_fee_rate: f64,
    pub gas_units: u64,
    pub min_confidence: Option<f64>,
    pub allow_default_fee: bool,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self {
            min_edge_bps: 30.0,
            min_profit: 10.0,
            gas_price_cap_gwei: 100.0,
            slippage_bps: 10.0,
            protocol_fee_rate: 0.0009,
            gas_units: 400_000,
            min_confidence: None,
            allow_default_fee: false,
        }
    }
}

struct Checked<'a> {
    cex: &'a PriceQuote,
    dex: &'a DexQuote,
    fee: &'a FeeEstimate,
    native_price: f64,
}

fn check_inputs<'a>(
    inputs: &'a EvaluationInputs,
    params: &EvaluationParams,
    now: DateTime<Utc>,
) -> Result<Checked<'a>, RejectReason> {
    let (Some(cex), Some(dex), Some(fee), Some(native_price)) =
        (&inputs.cex, &inputs.dex, &inputs.fee, inputs.native_price)
    else {
        return Err(RejectReason::MissingInput);
    };

    if !cex.is_fresh_at(now) || !dex.is_fresh_at(now) || !fee.is_fresh_at(now) {
        return Err(RejectReason::Stale);
    }

    let positive = |value: f64| value.is_finite() && value > 0.0;
    if !positive(cex.price) || !positive(dex.bid) || !positive(dex.ask) || !positive(native_price) || !positive(inputs.notional) {
        return Err(RejectReason::InvalidPrice);
    }
    if !fee.gwei.is_finite() || fee.gwei < 0.0 {
        return Err(RejectReason::InvalidPrice);
    }

    if !positive(dex.liquidity) || dex.liquidity < inputs.notional {
        return Err(RejectReason::Liquidity);
    }

    if fee.origin == FeeOrigin::Default && !params.allow_default_fee {
        return Err(RejectReason::DefaultFee);
    }

    Ok(Checked {
        cex,
        dex,
        fee,
        native_price,
    })
}

/// Evaluate one price gap. Identical arguments give an identical `Opportunity`.
pub fn evaluate(inputs: &EvaluationInputs, params: &EvaluationParams, now: DateTime<Utc>) -> Opportunity {
    let checked = match check_inputs(inputs, params, now) {
        Ok(checked) => checked,
        Err(reason) => return rejected_on_input(inputs, reason, now),
    };

    let cex_price = checked.cex.price;
    let notional = inputs.notional;

    // a CEX price inside the DEX spread leaves nothing to capture
    let (dex_price, edge_bps, gross_edge_value) = match checked.dex.crossing_price(cex_price) {
        Some(dex_price) => (
            dex_price,
            calculate_edge_bps(cex_price, dex_price),
            calculate_gross_edge(cex_price, dex_price, notional),
        ),
        None => (checked.dex.mid(), 0.0, 0.0),
    };
    let costs = CostBreakdown {
        gas_cost: calculate_gas_cost(checked.fee.gwei, params.gas_units, checked.native_price),
        protocol_fee: calculate_protocol_fee(notional, params.protocol_fee_rate),
        slippage_cost: calculate_slippage_cost(notional, params.slippage_bps),
    };
    let net_profit = gross_edge_value - costs.gas_cost - costs.protocol_fee - costs.slippage_cost;

    let reason = if net_profit < params.min_profit {
        Some(RejectReason::BelowMinProfit)
    } else if edge_bps < params.min_edge_bps {
        Some(RejectReason::BelowMinEdge)
    } else if checked.fee.gwei > params.gas_price_cap_gwei {
        Some(RejectReason::GasPriceCap)
    } else if matches!((params.min_confidence, inputs.confidence), (Some(min), Some(c)) if c < min) {
        Some(RejectReason::LowConfidence)
    } else {
        None
    };

    Opportunity {
        symbol: inputs.symbol.clone(),
        chain: inputs.chain.clone(),
        cex_price,
        dex_price,
        direction: Direction::between(cex_price, dex_price),
        edge_bps,
        notional,
        gross_edge_value,
        costs,
        net_profit,
        gas_gwei: checked.fee.gwei,
        executable: reason.is_none(),
        reason,
        confidence: inputs.confidence,
        fee_origin: Some(checked.fee.origin),
        timestamp: now,
    }
}

fn rejected_on_input(inputs: &EvaluationInputs, reason: RejectReason, now: DateTime<Utc>) -> Opportunity {
    Opportunity {
        symbol: inputs.symbol.clone(),
        chain: inputs.chain.clone(),
        cex_price: 0.0,
        dex_price: 0.0,
        direction: Direction::SellDex,
        edge_bps: 0.0,
        notional: inputs.notional,
        gross_edge_value: 0.0,
        costs: CostBreakdown::default(),
        net_profit: 0.0,
        gas_gwei: 0.0,
        executable: false,
        reason: Some(reason),
        confidence: inputs.confidence,
        fee_origin: inputs.fee.as_ref().map(|fee| fee.origin),
        timestamp: now,
    }
}
