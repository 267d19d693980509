//! DEX quote adapter trait

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::endpoint::ChainNode;
use crate::shared::errors::NodeError;
use crate::shared::types::Token;

/// Result of pricing a swap on one venue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapQuote {
    /// Output received for the requested input, in `token_out` units
    pub amount_out: f64,
    /// Pool depth expressed in `token_in` units
    pub liquidity: f64,
}

/// Common interface for all DEX venues. Reads go through the node handed in
/// by the caller so the endpoint pool records their outcome.
#[async_trait]
pub trait DexQuoteAdapter: Send + Sync {
    fn venue(&self) -> &str;

    async fn get_quote(
        &self,
        node: Arc<dyn ChainNode>,
        token_in: &Token,
        token_out: &Token,
        amount_in: f64,
    ) -> Result<SwapQuote, NodeError>;
}
