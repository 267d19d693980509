//! Seams to the deployed flash-loan contract and the external signer

use async_trait::async_trait;

use super::execution_plan::ExecutionPlan;
use crate::domain::endpoint::{LogEntry, UnsignedTransaction};
use crate::shared::errors::ExecutionError;

/// ABI of the on-chain borrow/swap/repay entry point
pub trait FlashLoanContract: Send + Sync {
    fn address(&self) -> &str;

    /// Calldata executing `plan` atomically
    fn encode_execute(&self, plan: &ExecutionPlan) -> Result<Vec<u8>, ExecutionError>;

    /// Profit in borrow-asset base units returned by a simulated call
    fn decode_profit(&self, output: &[u8]) -> Result<u128, ExecutionError>;

    /// Profit reported by the contract's event in a mined receipt
    fn profit_from_logs(&self, logs: &[LogEntry]) -> Option<u128>;
}

/// Signs transactions for the executing account; keys never enter the process
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Raw signed transaction bytes, ready for eth_sendRawTransaction
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, ExecutionError>;
}
