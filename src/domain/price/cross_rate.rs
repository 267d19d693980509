//! Synthetic cross rates (A/C from A/B and B/C)

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::PriceQuote;
use crate::shared::errors::PriceError;
use crate::shared::types::Pair;

/// Validated chain of legs leading from `target.base` to `target.quote`
#[derive(Debug, Clone, PartialEq)]
pub struct CrossRoute {
    target: Pair,
    /// Leg pair and whether it is walked quote-to-base
    legs: Vec<(Pair, bool)>,
}

impl CrossRoute {
    pub fn new(target: Pair, legs: Vec<Pair>) -> Result<Self, PriceError> {
        if legs.is_empty() {
            return Err(PriceError::InvalidCrossRoute {
                pair: target,
                reason: "no legs".to_string(),
            });
        }

        let mut current = target.base.clone();
        let mut visited = HashSet::from([current.clone()]);
        let mut oriented = Vec::with_capacity(legs.len());

        for leg in legs {
            if leg == target || leg == target.inverse() {
                return Err(PriceError::CycleDetected(target));
            }

            let (next, inverted) = if leg.base == current {
                (leg.quote.clone(), false)
            } else if leg.quote == current {
                (leg.base.clone(), true)
            } else {
                return Err(PriceError::InvalidCrossRoute {
                    pair: target,
                    reason: format!("leg {} does not continue from {}", leg, current),
                });
            };

            if !visited.insert(next.clone()) {
                return Err(PriceError::InvalidCrossRoute {
                    pair: target,
                    reason: format!("asset {} visited twice", next),
                });
            }
            current = next;
            oriented.push((leg, inverted));
        }

        if current != target.quote {
            return Err(PriceError::InvalidCrossRoute {
                pair: target,
                reason: format!("route ends at {}", current),
            });
        }

        Ok(Self { target, legs: oriented })
    }

    pub fn target(&self) -> &Pair {
        &self.target
    }

    pub fn legs(&self) -> impl Iterator<Item = &Pair> {
        self.legs.iter().map(|(pair, _)| pair)
    }

    /// Combine leg quotes, given in leg order, into the synthetic quote.
    /// The result is as old as its oldest leg and lives as long as its shortest TTL.
    pub fn combine(&self, quotes: &[PriceQuote]) -> Option<PriceQuote> {
        if quotes.len() != self.legs.len() {
            return None;
        }

        let mut price = 1.0;
        let mut timestamp: Option<DateTime<Utc>> = None;
        let mut ttl = None;
        let mut sources = Vec::with_capacity(quotes.len());

        for ((leg, inverted), quote) in self.legs.iter().zip(quotes) {
            if &quote.pair != leg || quote.price <= 0.0 {
                return None;
            }
            price *= if *inverted { 1.0 / quote.price } else { quote.price };
            timestamp = Some(timestamp.map_or(quote.timestamp, |t| t.min(quote.timestamp)));
            ttl = Some(ttl.map_or(quote.ttl, |t: std::time::Duration| t.min(quote.ttl)));
            sources.push(quote.source.clone());
        }

        Some(PriceQuote {
            pair: self.target.clone(),
            source: format!("synthetic({})", sources.join(",")),
            price,
            timestamp: timestamp?,
            ttl: ttl?,
        })
    }
}
