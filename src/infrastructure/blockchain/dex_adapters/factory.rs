use std::sync::Arc;

use super::uniswap_v2_adapter::UniswapV2Adapter;
use crate::domain::dex::DexQuoteAdapter;
use crate::shared::config::DexVenueConfig;

/// Factory for creating DEX quote adapters
pub struct DexAdapterFactory;

impl DexAdapterFactory {
    /// Create an adapter for the configured venue
    pub fn create_adapter(venue: &DexVenueConfig) -> Arc<dyn DexQuoteAdapter> {
        match venue {
            DexVenueConfig::UniswapV2 { pool, fee_bps } => {
                Arc::new(UniswapV2Adapter::new(Self::venue_name(venue), pool.clone(), *fee_bps))
            }
        }
    }

    /// Venue label used in quotes and route matching
    pub fn venue_name(venue: &DexVenueConfig) -> &'static str {
        match venue {
            DexVenueConfig::UniswapV2 { .. } => "uniswap_v2",
        }
    }
}
