//! Gas domain - per-chain fee estimates refreshed through the endpoint pool

mod gas_oracle;

pub use gas_oracle::{DefaultGwei, FeeEstimate, FeeOrigin, FeeTier, GasOracle, GasOracleConfig};
