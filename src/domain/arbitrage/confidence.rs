//! Optional external confidence collaborator

use async_trait::async_trait;

use crate::shared::types::{ChainId, Pair};

/// Supplies a confidence in [0, 1] for a (symbol, chain) gap. `None` means
/// no opinion, which does not gate the opportunity.
#[async_trait]
pub trait ConfidenceProvider: Send + Sync {
    async fn confidence(&self, symbol: &Pair, chain: &ChainId, cex_price: f64, dex_price: f64) -> Option<f64>;
}
