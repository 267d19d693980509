//! HTTP confidence provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::arbitrage::ConfidenceProvider;
use crate::shared::errors::AppError;
use crate::shared::types::{ChainId, Pair};

#[derive(Debug, Deserialize)]
struct ConfidenceResponse {
    confidence: Option<f64>,
}

/// Asks an external scoring service about a price gap. Any failure is
/// treated as "no opinion".
pub struct HttpConfidenceProvider {
    url: String,
    http_client: Client,
}

impl HttpConfidenceProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            http_client,
        })
    }
}

fn normalize(response: ConfidenceResponse) -> Option<f64> {
    response
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
}

#[async_trait]
impl ConfidenceProvider for HttpConfidenceProvider {
    async fn confidence(&self, symbol: &Pair, chain: &ChainId, cex_price: f64, dex_price: f64) -> Option<f64> {
        let symbol = symbol.to_string();
        let cex = cex_price.to_string();
        let dex = dex_price.to_string();
        let query = [
            ("symbol", symbol.as_str()),
            ("chain", chain.as_str()),
            ("cex_price", cex.as_str()),
            ("dex_price", dex.as_str()),
        ];

        let response = match self.http_client.get(&self.url).query(&query).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("Confidence service returned {}", response.status());
                return None;
            }
            Err(e) => {
                debug!("Confidence service unreachable: {}", e);
                return None;
            }
        };

        match response.json::<ConfidenceResponse>().await {
            Ok(body) => normalize(body),
            Err(e) => {
                debug!("Confidence response unreadable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<f64> {
        normalize(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(parse(r#"{"confidence": 0.8}"#), Some(0.8));
        assert_eq!(parse(r#"{"confidence": 1.7}"#), Some(1.0));
        assert_eq!(parse(r#"{"confidence": -2}"#), Some(0.0));
        assert_eq!(parse(r#"{"confidence": null}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }

    #[tokio::test]
    async fn test_unreachable_service_has_no_opinion() {
        let provider = HttpConfidenceProvider::new("http://127.0.0.1:9/score", Duration::from_millis(200)).unwrap();
        let confidence = provider
            .confidence(&Pair::new("ETH", "USDC"), &ChainId::new("ethereum"), 3000.0, 3010.0)
            .await;
        assert_eq!(confidence, None);
    }
}
