//! EVM chain access: JSON-RPC nodes, DEX adapters, the flash-loan contract and the signer

pub mod dex_adapters;
pub mod flash_contract;
pub mod remote_signer;
pub mod rpc_client;

pub use dex_adapters::{DexAdapterFactory, UniswapV2Adapter};
pub use flash_contract::FlashArbContract;
pub use remote_signer::RemoteSigner;
pub use rpc_client::JsonRpcNode;
