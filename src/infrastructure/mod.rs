//! Infrastructure layer - adapters to chains, venues and outputs

pub mod blockchain;
pub mod confidence;
pub mod price_sources;
pub mod telemetry;

pub use confidence::HttpConfidenceProvider;
pub use telemetry::{JsonLinesSink, TracingSink};
