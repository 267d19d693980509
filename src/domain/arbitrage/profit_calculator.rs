//! Cost and edge arithmetic for a CEX/DEX price gap

use serde::{Deserialize, Serialize};

/// Costs of one round trip, in quote currency
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub gas_cost: f64,
    pub protocol_fee: f64,
    pub slippage_cost: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.gas_cost + self.protocol_fee + self.slippage_cost
    }
}

/// Gap between two prices in basis points of the lower one
pub fn calculate_edge_bps(price_a: f64, price_b: f64) -> f64 {
    (price_a - price_b).abs() / price_a.min(price_b) * 10_000.0
}

/// Value of the gap captured by trading `notional`
pub fn calculate_gross_edge(price_a: f64, price_b: f64, notional: f64) -> f64 {
    notional * (price_a - price_b).abs() / price_a.min(price_b)
}

/// Gas spend converted to quote currency through the native asset price
pub fn calculate_gas_cost(gwei: f64, gas_units: u64, native_price: f64) -> f64 {
    gwei * 1e-9 * gas_units as f64 * native_price
}

pub fn calculate_protocol_fee(notional: f64, fee_rate: f64) -> f64 {
    notional * fee_rate
}

pub fn calculate_slippage_cost(notional: f64, slippage_bps: f64) -> f64 {
    notional * slippage_bps / 10_000.0
}
