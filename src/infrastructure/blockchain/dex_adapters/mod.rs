pub mod factory;
pub mod uniswap_v2_adapter;

pub use factory::DexAdapterFactory;
pub use uniswap_v2_adapter::UniswapV2Adapter;
