use async_trait::async_trait;
use ethabi::{ParamType, Uint};
use std::sync::Arc;

use crate::domain::dex::{DexQuoteAdapter, SwapQuote};
use crate::domain::endpoint::{CallRequest, ChainNode};
use crate::shared::errors::NodeError;
use crate::shared::types::Token;

const BPS: u64 = 10_000;

/// Constant-product pair contract (Uniswap V2 and its forks)
pub struct UniswapV2Adapter {
    venue: String,
    pool: String,
    fee_bps: u32,
}

impl UniswapV2Adapter {
    pub fn new(venue: impl Into<String>, pool: impl Into<String>, fee_bps: u32) -> Self {
        Self {
            venue: venue.into(),
            pool: pool.into(),
            fee_bps,
        }
    }

    fn decode_reserves(output: &[u8]) -> Result<(Uint, Uint), NodeError> {
        let tokens = ethabi::decode(
            &[ParamType::Uint(112), ParamType::Uint(112), ParamType::Uint(32)],
            output,
        )
        .map_err(|e| NodeError::InvalidResponse(format!("getReserves: {}", e)))?;

        let mut values = tokens.into_iter().filter_map(|t| t.into_uint());
        match (values.next(), values.next()) {
            (Some(reserve0), Some(reserve1)) => Ok((reserve0, reserve1)),
            _ => Err(NodeError::InvalidResponse("getReserves: missing reserves".to_string())),
        }
    }
}

/// Output amount of a constant-product swap after the pool fee
pub fn amount_out(amount_in: Uint, reserve_in: Uint, reserve_out: Uint, fee_bps: u32) -> Uint {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return Uint::zero();
    }
    let fee_bps = u64::from(fee_bps).min(BPS);
    let amount_in_with_fee = amount_in * Uint::from(BPS - fee_bps);
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * Uint::from(BPS) + amount_in_with_fee;
    numerator / denominator
}

fn to_u128(value: Uint) -> u128 {
    if value.bits() > 128 {
        u128::MAX
    } else {
        value.low_u128()
    }
}

#[async_trait]
impl DexQuoteAdapter for UniswapV2Adapter {
    fn venue(&self) -> &str {
        &self.venue
    }

    async fn get_quote(
        &self,
        node: Arc<dyn ChainNode>,
        token_in: &Token,
        token_out: &Token,
        amount_in: f64,
    ) -> Result<SwapQuote, NodeError> {
        let selector = ethabi::short_signature("getReserves", &[]);
        let output = node.call(&CallRequest::new(&self.pool, selector.to_vec())).await?;
        let (reserve0, reserve1) = Self::decode_reserves(&output)?;

        // token0 is the lower address
        let (reserve_in, reserve_out) =
            if token_in.address.to_lowercase() < token_out.address.to_lowercase() {
                (reserve0, reserve1)
            } else {
                (reserve1, reserve0)
            };

        let raw_in = Uint::from(token_in.to_base_units(amount_in));
        let raw_out = amount_out(raw_in, reserve_in, reserve_out, self.fee_bps);

        Ok(SwapQuote {
            amount_out: token_out.from_base_units(to_u128(raw_out)),
            liquidity: 2.0 * token_in.from_base_units(to_u128(reserve_in)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNode;
    use ethabi::Token as AbiToken;

    const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    fn reserves(reserve0: u128, reserve1: u128) -> Vec<u8> {
        ethabi::encode(&[
            AbiToken::Uint(reserve0.into()),
            AbiToken::Uint(reserve1.into()),
            AbiToken::Uint(1_700_000_000u64.into()),
        ])
    }

    #[test]
    fn test_amount_out_applies_fee() {
        let out = amount_out(Uint::from(1000u64), Uint::from(1_000_000u64), Uint::from(1_000_000u64), 30);
        // 9_970_000 * 1e6 / (1e10 + 9_970_000)
        assert_eq!(out, Uint::from(996u64));
        let one = Uint::one();
        assert_eq!(amount_out(Uint::zero(), one, one, 30), Uint::zero());
        assert_eq!(amount_out(one, Uint::zero(), one, 30), Uint::zero());
    }

    #[tokio::test]
    async fn test_quote_orders_reserves_by_address() {
        let usdc = Token::new("USDC", USDC, 6);
        let weth = Token::new("WETH", WETH, 18);

        // USDC sorts first: 30M USDC vs 10k WETH
        let node = Arc::new(MockNode::new());
        node.push_call(Ok(reserves(30_000_000_000_000, 10_000_000_000_000_000_000_000)));
        let adapter = UniswapV2Adapter::new("uniswap_v2", "0xpool", 0);

        let quote = adapter.get_quote(node.clone(), &usdc, &weth, 3000.0).await.unwrap();
        assert!((quote.amount_out - 0.99990001).abs() < 1e-6);
        assert!((quote.liquidity - 60_000_000.0).abs() < 1e-6);

        let selector = ethabi::short_signature("getReserves", &[]);
        assert_eq!(node.requests()[0].data, selector.to_vec());
        assert_eq!(node.requests()[0].to, "0xpool");
    }

    #[tokio::test]
    async fn test_malformed_reserves_rejected() {
        let node = Arc::new(MockNode::new());
        node.push_call(Ok(vec![0u8; 8]));
        let adapter = UniswapV2Adapter::new("uniswap_v2", "0xpool", 30);
        let err = adapter
            .get_quote(node, &Token::new("A", "0x01", 18), &Token::new("B", "0x02", 18), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidResponse(_)));
    }
}
