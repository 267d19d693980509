//! DEX domain - on-chain price and liquidity quotes

mod dex_interface;
mod quote_provider;

pub use dex_interface::{DexQuoteAdapter, SwapQuote};
pub use quote_provider::{DexMarket, DexQuoteProvider};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::shared::types::Pair;
use crate::shared::utils::is_fresh;

/// Two-sided price and depth of a pair on a DEX, in quote currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DexQuote {
    pub venue: String,
    pub pair: Pair,
    /// Effective price received when selling base for `amount_in` worth of quote
    pub bid: f64,
    /// Effective price paid when spending `amount_in` of quote on base
    pub ask: f64,
    pub liquidity: f64,
    /// Trade size the price was computed for, in quote currency
    pub amount_in: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub ttl: Duration,
}

impl DexQuote {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        is_fresh(self.timestamp, self.ttl, now)
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// The side that trades against `cex_price` at a gain: the bid when it
    /// is above the CEX, the ask when it is below. `None` while the CEX
    /// price sits inside the spread.
    pub fn crossing_price(&self, cex_price: f64) -> Option<f64> {
        if self.bid > cex_price {
            Some(self.bid)
        } else if self.ask < cex_price {
            Some(self.ask)
        } else {
            None
        }
    }
}
