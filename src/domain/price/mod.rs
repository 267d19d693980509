//! Price domain - centralized venue prices, caching and cross rates

mod cross_rate;
mod price_aggregator;
mod price_source;
mod symbol_map;

pub use cross_rate::CrossRoute;
pub use price_aggregator::{PriceAggregator, SourceSettings};
pub use price_source::{PriceSource, SourcePrice};
pub use symbol_map::SymbolMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::shared::types::Pair;
use crate::shared::utils::is_fresh;

/// Price observed on a centralized venue. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub pair: Pair,
    pub source: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub ttl: Duration,
}

impl PriceQuote {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        is_fresh(self.timestamp, self.ttl, now)
    }
}
