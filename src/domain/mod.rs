//! Domain layer - core business logic and entities

pub mod arbitrage;
pub mod dex;
pub mod endpoint;
pub mod execution;
pub mod gas;
pub mod price;
pub mod telemetry;
