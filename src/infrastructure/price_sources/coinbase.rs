use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{get_json, parse_price};
use crate::domain::price::{PriceSource, SourcePrice};
use crate::shared::errors::SourceError;

const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Response of `/products/{id}/ticker`
#[derive(Debug, Deserialize)]
struct CoinbaseTicker {
    price: String,
    time: Option<DateTime<Utc>>,
}

pub struct CoinbaseSource {
    id: String,
    base_url: String,
    http_client: Client,
}

impl CoinbaseSource {
    pub fn new(id: &str, base_url: Option<String>, http_client: Client) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_client,
        }
    }

    fn parse(body: CoinbaseTicker) -> Result<SourcePrice, SourceError> {
        Ok(SourcePrice {
            price: parse_price(&body.price)?,
            timestamp: body.time.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl PriceSource for CoinbaseSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_price(&self, ticker: &str) -> Result<SourcePrice, SourceError> {
        let url = format!("{}/products/{}/ticker", self.base_url, ticker);
        let body: CoinbaseTicker = get_json(&self.http_client, &url).await?;
        Self::parse(body)
    }
}
