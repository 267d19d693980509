//! Execution domain - simulate-before-submit flash-loan execution

mod contract;
mod execution_plan;
mod flash_executor;
mod inflight;
mod route_blacklist;

pub use contract::{FlashLoanContract, TransactionSigner};
pub use execution_plan::{
    BorrowSide, ExecutionAttempt, ExecutionPlan, ExecutionResult, ExecutionStage, ExecutionStatus, Outcome, Route,
};
pub use flash_executor::{ExecutionLimits, ExecutorConfig, ExecutorParts, FlashExecutor};
pub use inflight::{InFlightGuard, InFlightPolicy, InFlightRegistry, PendingTx};
pub use route_blacklist::{BlacklistConfig, RouteBlacklist};
