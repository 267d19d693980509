//! Centralized venue price feeds

pub mod binance;
pub mod coinbase;
pub mod kraken;

pub use binance::BinanceSource;
pub use coinbase::CoinbaseSource;
pub use kraken::KrakenSource;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::price::PriceSource;
use crate::shared::config::{PriceSourceConfig, PriceSourceKind};
use crate::shared::errors::{AppError, SourceError};

pub(crate) fn http_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// GET a JSON document, mapping HTTP failures onto the source taxonomy
pub(crate) async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, SourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::Transport(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return Err(SourceError::RateLimited);
    }
    if !status.is_success() {
        return Err(SourceError::Http(status.as_u16()));
    }

    response
        .json()
        .await
        .map_err(|e| SourceError::InvalidResponse(e.to_string()))
}

pub(crate) fn parse_price(value: &str) -> Result<f64, SourceError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| SourceError::InvalidResponse(format!("bad price '{}': {}", value, e)))
}

/// Create the adapter for a configured source
pub fn build_price_source(config: &PriceSourceConfig) -> Result<Arc<dyn PriceSource>, AppError> {
    let client = http_client(config.timeout)?;
    let source: Arc<dyn PriceSource> = match config.kind {
        PriceSourceKind::Binance => Arc::new(BinanceSource::new(&config.id, config.base_url.clone(), client)),
        PriceSourceKind::Coinbase => Arc::new(CoinbaseSource::new(&config.id, config.base_url.clone(), client)),
        PriceSourceKind::Kraken => Arc::new(KrakenSource::new(&config.id, config.base_url.clone(), client)),
    };
    Ok(source)
}
