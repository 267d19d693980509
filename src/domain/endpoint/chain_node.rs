//! Chain node capability interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::errors::NodeError;

/// Read-only contract call (eth_call)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<String>,
    pub to: String,
    pub data: Vec<u8>,
    pub gas: Option<u64>,
}

impl CallRequest {
    pub fn new(to: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            from: None,
            to: to.into(),
            data,
            gas: None,
        }
    }

    pub fn from_account(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// Result of eth_feeHistory, amounts in wei
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeeHistory {
    pub oldest_block: u64,
    /// One entry per block plus the projected next block
    pub base_fee_per_gas: Vec<u128>,
    pub gas_used_ratio: Vec<f64>,
    /// Per block, one reward per requested percentile
    pub reward: Vec<Vec<u128>>,
}

/// Log emitted by a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

/// Mined transaction receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub success: bool,
    pub gas_used: u64,
    pub block_number: u64,
    pub logs: Vec<LogEntry>,
}

/// EIP-1559 transaction handed to the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub from: String,
    pub to: String,
    pub data: Vec<u8>,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Common interface for a remote chain node
#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Dry-run a call against latest state
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, NodeError>;

    async fn fee_history(&self, block_count: u64, percentiles: &[f64]) -> Result<FeeHistory, NodeError>;

    /// Broadcast a signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, NodeError>;

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, NodeError>;

    /// Pending nonce for an account
    async fn transaction_count(&self, account: &str) -> Result<u64, NodeError>;

    /// Nonce at the latest block, counting only mined transactions
    async fn mined_transaction_count(&self, account: &str) -> Result<u64, NodeError>;
}
