//! DEX quote provider - routes venue reads through the endpoint pool

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::dex_interface::DexQuoteAdapter;
use super::DexQuote;
use crate::domain::endpoint::EndpointPool;
use crate::shared::errors::{NodeError, PriceError};
use crate::shared::types::{Pair, Token};

/// A pair tradeable on one venue of this chain
#[derive(Clone)]
pub struct DexMarket {
    pub pair: Pair,
    pub base: Token,
    pub quote: Token,
    pub adapter: Arc<dyn DexQuoteAdapter>,
}

/// Quotes every configured market of one chain
pub struct DexQuoteProvider {
    pool: Arc<EndpointPool>,
    markets: HashMap<Pair, DexMarket>,
    quote_ttl: Duration,
    max_attempts: u32,
}

impl DexQuoteProvider {
    pub fn new(pool: Arc<EndpointPool>, quote_ttl: Duration, max_attempts: u32) -> Self {
        Self {
            pool,
            markets: HashMap::new(),
            quote_ttl,
            max_attempts,
        }
    }

    pub fn add_market(&mut self, market: DexMarket) {
        self.markets.insert(market.pair.clone(), market);
    }

    pub fn market(&self, pair: &Pair) -> Option<&DexMarket> {
        self.markets.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.markets.keys()
    }

    /// Both sides of `notional`: the ask buys base with `notional` of quote,
    /// the bid sells that same base amount back. Pool fee and price impact
    /// are inside both prices.
    pub async fn get_quote(&self, pair: &Pair, notional: f64) -> Result<DexQuote, PriceError> {
        let market = self
            .markets
            .get(pair)
            .ok_or_else(|| PriceError::UnknownPair(pair.clone()))?;

        let (buy, sell) = self
            .pool
            .call_with_failover(self.max_attempts, |node| async move {
                let buy = market
                    .adapter
                    .get_quote(Arc::clone(&node), &market.quote, &market.base, notional)
                    .await?;
                let sell = market
                    .adapter
                    .get_quote(node, &market.base, &market.quote, buy.amount_out)
                    .await?;
                Ok::<_, NodeError>((buy, sell))
            })
            .await?;

        let base_amount = buy.amount_out;
        if !base_amount.is_finite() || base_amount <= 0.0 || !sell.amount_out.is_finite() || sell.amount_out <= 0.0 {
            return Err(PriceError::InsufficientLiquidity(pair.clone()));
        }

        let quote = DexQuote {
            venue: market.adapter.venue().to_string(),
            pair: pair.clone(),
            bid: sell.amount_out / base_amount,
            ask: notional / base_amount,
            liquidity: buy.liquidity,
            amount_in: notional,
            timestamp: Utc::now(),
            ttl: self.quote_ttl,
        };
        debug!(
            "DEX quote {} on {}: bid {:.4} ask {:.4} (liquidity {:.2})",
            pair, quote.venue, quote.bid, quote.ask, quote.liquidity
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dex::SwapQuote;
    use crate::domain::endpoint::{ChainNode, PoolConfig};
    use crate::shared::errors::NodeError;
    use crate::shared::types::ChainId;
    use crate::domain::arbitrage::{evaluate, EvaluationInputs, EvaluationParams, RejectReason};
    use crate::domain::gas::{FeeEstimate, FeeOrigin, FeeTier};
    use crate::domain::price::PriceQuote;
    use crate::infrastructure::blockchain::UniswapV2Adapter;
    use crate::testing::MockNode;
    use async_trait::async_trait;

    /// Prices every swap at `price` quote per base, with no spread
    struct FixedAdapter {
        price: f64,
    }

    #[async_trait]
    impl DexQuoteAdapter for FixedAdapter {
        fn venue(&self) -> &str {
            "fixed"
        }

        async fn get_quote(
            &self,
            node: Arc<dyn ChainNode>,
            token_in: &Token,
            _token_out: &Token,
            amount_in: f64,
        ) -> Result<SwapQuote, NodeError> {
            node.transaction_count("0x0").await?;
            let amount_out = if token_in.symbol == "USDC" {
                amount_in / self.price
            } else {
                amount_in * self.price
            };
            Ok(SwapQuote {
                amount_out,
                liquidity: amount_in * 100.0,
            })
        }
    }

    fn pool(node: Arc<MockNode>) -> Arc<EndpointPool> {
        Arc::new(EndpointPool::new(
            ChainId::new("ethereum"),
            vec![("mock".to_string(), node as Arc<dyn ChainNode>)],
            PoolConfig::default(),
        ))
    }

    fn provider(price: f64) -> (Arc<MockNode>, DexQuoteProvider) {
        let node = Arc::new(MockNode::new());
        let mut provider = DexQuoteProvider::new(pool(node.clone()), Duration::from_secs(5), 2);
        provider.add_market(DexMarket {
            pair: Pair::new("ETH", "USDC"),
            base: Token::new("WETH", "0xc02a", 18),
            quote: Token::new("USDC", "0xa0b8", 6),
            adapter: Arc::new(FixedAdapter { price }),
        });
        (node, provider)
    }

    #[tokio::test]
    async fn test_quote_price_is_quote_per_base() {
        let (node, provider) = provider(3050.0);
        let quote = provider.get_quote(&Pair::new("ETH", "USDC"), 18_300.0).await.unwrap();
        assert!((quote.ask - 3050.0).abs() < 1e-9);
        assert!((quote.bid - 3050.0).abs() < 1e-9);
        assert_eq!(quote.liquidity, 1_830_000.0);
        assert_eq!(quote.venue, "fixed");
        assert_eq!(node.calls("transaction_count"), 2);
    }

    #[tokio::test]
    async fn test_empty_pool_is_insufficient_liquidity() {
        let (_, provider) = provider(f64::INFINITY);
        let err = provider.get_quote(&Pair::new("ETH", "USDC"), 18_300.0).await.unwrap_err();
        assert!(matches!(err, PriceError::InsufficientLiquidity(_)));
    }

    #[tokio::test]
    async fn test_unknown_market() {
        let (_, provider) = provider(3050.0);
        let err = provider.get_quote(&Pair::new("BTC", "USDC"), 1.0).await.unwrap_err();
        assert!(matches!(err, PriceError::UnknownPair(_)));
    }

    #[tokio::test]
    async fn test_balanced_pool_has_no_edge_at_mid() {
        // 30M USDC / 10k WETH, mid 3000, 30 bps fee
        let node = Arc::new(MockNode::new());
        node.set_call_default(Ok(ethabi::encode(&[
            ethabi::Token::Uint(30_000_000_000_000u128.into()),
            ethabi::Token::Uint(10_000_000_000_000_000_000_000u128.into()),
            ethabi::Token::Uint(1_700_000_000u64.into()),
        ])));
        let usdc = Token::new("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6);
        let weth = Token::new("WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18);
        let pair = Pair::new("ETH", "USDC");
        let mut provider = DexQuoteProvider::new(pool(node), Duration::from_secs(12), 2);
        provider.add_market(DexMarket {
            pair: pair.clone(),
            base: weth,
            quote: usdc,
            adapter: Arc::new(UniswapV2Adapter::new("uniswap_v2", "0xpool", 30)),
        });

        let quote = provider.get_quote(&pair, 100_000.0).await.unwrap();
        assert!(quote.bid < 3000.0 && quote.ask > 3000.0, "{:?}", quote);
        assert!((quote.ask - 3019.03).abs() < 0.01);
        assert_eq!(quote.crossing_price(3000.0), None);

        let now = Utc::now();
        let inputs = EvaluationInputs {
            symbol: pair.clone(),
            chain: ChainId::new("ethereum"),
            cex: Some(PriceQuote {
                pair,
                source: "binance".to_string(),
                price: 3000.0,
                timestamp: now,
                ttl: Duration::from_secs(5),
            }),
            dex: Some(quote),
            fee: Some(FeeEstimate {
                chain: ChainId::new("ethereum"),
                tier: FeeTier::Median,
                gwei: 20.0,
                timestamp: now,
                ttl: Duration::from_secs(60),
                origin: FeeOrigin::Measured,
            }),
            native_price: Some(3000.0),
            notional: 100_000.0,
            confidence: None,
        };
        let opportunity = evaluate(&inputs, &EvaluationParams::default(), now);
        assert!(!opportunity.executable);
        assert_eq!(opportunity.edge_bps, 0.0);
        assert_eq!(opportunity.reason, Some(RejectReason::BelowMinProfit));
    }
}
