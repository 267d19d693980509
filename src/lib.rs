//! flasharb - CEX/DEX price-gap detection and flash-loan execution
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

#[cfg(test)]
pub mod testing;

// Re-export main types for convenience
pub use domain::arbitrage::{evaluate, Opportunity};
pub use domain::endpoint::{EndpointPool, EndpointRegistry};
pub use domain::execution::FlashExecutor;
pub use domain::gas::GasOracle;
pub use domain::price::PriceAggregator;
