//! Telemetry sink interface
//!
//! Sinks are fire-and-forget: the pipeline never waits on or fails because
//! of them.

use crate::domain::arbitrage::Opportunity;
use crate::domain::execution::ExecutionResult;

pub trait TelemetrySink: Send + Sync {
    fn record_opportunity(&self, opportunity: &Opportunity);

    fn record_execution(&self, result: &ExecutionResult);
}
