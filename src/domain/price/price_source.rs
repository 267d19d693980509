//! Price source capability interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::errors::SourceError;

/// Raw answer from a venue
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePrice {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Centralized venue price feed. `ticker` is already in the venue's own notation.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn id(&self) -> &str;

    async fn get_price(&self, ticker: &str) -> Result<SourcePrice, SourceError>;
}
