use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::{get_json, parse_price};
use crate::domain::price::{PriceSource, SourcePrice};
use crate::shared::errors::SourceError;

const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

/// Response of `/0/public/Ticker`
#[derive(Debug, Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

#[derive(Debug, Deserialize)]
struct KrakenTicker {
    /// Last trade: [price, lot volume]
    c: Vec<String>,
}

pub struct KrakenSource {
    id: String,
    base_url: String,
    http_client: Client,
}

impl KrakenSource {
    pub fn new(id: &str, base_url: Option<String>, http_client: Client) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_client,
        }
    }

    fn parse(body: KrakenResponse) -> Result<f64, SourceError> {
        if body.error.iter().any(|e| e.contains("Too many requests") || e.contains("Rate limit")) {
            return Err(SourceError::RateLimited);
        }
        if !body.error.is_empty() {
            return Err(SourceError::InvalidResponse(body.error.join("; ")));
        }
        // Kraken answers under its own canonical pair name
        let ticker = body
            .result
            .into_values()
            .next()
            .ok_or_else(|| SourceError::InvalidResponse("empty ticker result".to_string()))?;
        let last = ticker
            .c
            .first()
            .ok_or_else(|| SourceError::InvalidResponse("ticker has no last trade".to_string()))?;
        parse_price(last)
    }
}

#[async_trait]
impl PriceSource for KrakenSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_price(&self, ticker: &str) -> Result<SourcePrice, SourceError> {
        let url = format!("{}/0/public/Ticker?pair={}", self.base_url, ticker);
        let body: KrakenResponse = get_json(&self.http_client, &url).await?;
        Ok(SourcePrice {
            price: Self::parse(body)?,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<f64, SourceError> {
        KrakenSource::parse(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_last_trade() {
        let price = parse(r#"{"error":[],"result":{"XETHZUSD":{"a":["3050.2","1","1.0"],"c":["3050.10","0.25"]}}}"#);
        assert_eq!(price.unwrap(), 3050.1);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(r#"{"error":["EAPI:Rate limit exceeded"]}"#), Err(SourceError::RateLimited));
        assert!(matches!(
            parse(r#"{"error":["EQuery:Unknown asset pair"]}"#),
            Err(SourceError::InvalidResponse(_))
        ));
        assert!(parse(r#"{"error":[],"result":{}}"#).is_err());
    }
}
