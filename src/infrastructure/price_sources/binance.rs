use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use super::{get_json, parse_price};
use crate::domain::price::{PriceSource, SourcePrice};
use crate::shared::errors::SourceError;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Response of `/api/v3/ticker/price`
#[derive(Debug, Deserialize)]
struct BinanceTicker {
    symbol: String,
    price: String,
}

pub struct BinanceSource {
    id: String,
    base_url: String,
    http_client: Client,
}

impl BinanceSource {
    pub fn new(id: &str, base_url: Option<String>, http_client: Client) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_client,
        }
    }

    fn parse(ticker: &str, body: BinanceTicker) -> Result<f64, SourceError> {
        if !body.symbol.eq_ignore_ascii_case(ticker) {
            return Err(SourceError::InvalidResponse(format!(
                "asked for {} but got {}",
                ticker, body.symbol
            )));
        }
        parse_price(&body.price)
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_price(&self, ticker: &str) -> Result<SourcePrice, SourceError> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, ticker);
        let body: BinanceTicker = get_json(&self.http_client, &url).await?;
        // The ticker endpoint carries no timestamp
        Ok(SourcePrice {
            price: Self::parse(ticker, body)?,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticker() {
        let body: BinanceTicker = serde_json::from_str(r#"{"symbol":"ETHUSDT","price":"3050.12000000"}"#).unwrap();
        assert_eq!(BinanceSource::parse("ETHUSDT", body).unwrap(), 3050.12);

        let other: BinanceTicker = serde_json::from_str(r#"{"symbol":"BTCUSDT","price":"1"}"#).unwrap();
        assert!(BinanceSource::parse("ETHUSDT", other).is_err());
    }
}
