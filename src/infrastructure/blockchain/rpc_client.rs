//! EVM JSON-RPC client implementing `ChainNode`

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::endpoint::{CallRequest, ChainNode, FeeHistory, LogEntry, TxReceipt};
use crate::shared::errors::NodeError;
use crate::shared::utils::{decode_hex_data, encode_hex_data, parse_hex_quantity, to_hex_quantity};

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeeHistory {
    oldest_block: String,
    base_fee_per_gas: Vec<String>,
    #[serde(default)]
    gas_used_ratio: Vec<f64>,
    #[serde(default)]
    reward: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    status: Option<String>,
    gas_used: String,
    block_number: String,
    #[serde(default)]
    logs: Vec<RawLog>,
}

fn quantity(value: &str) -> Result<u128, NodeError> {
    parse_hex_quantity(value).map_err(NodeError::InvalidResponse)
}

fn quantity_u64(value: &str) -> Result<u64, NodeError> {
    let raw = quantity(value)?;
    u64::try_from(raw).map_err(|_| NodeError::InvalidResponse(format!("quantity {} overflows u64", value)))
}

fn data(value: &str) -> Result<Vec<u8>, NodeError> {
    decode_hex_data(value).map_err(NodeError::InvalidResponse)
}

impl RawFeeHistory {
    fn into_domain(self) -> Result<FeeHistory, NodeError> {
        Ok(FeeHistory {
            oldest_block: quantity_u64(&self.oldest_block)?,
            base_fee_per_gas: self
                .base_fee_per_gas
                .iter()
                .map(|v| quantity(v))
                .collect::<Result<_, _>>()?,
            gas_used_ratio: self.gas_used_ratio,
            reward: self
                .reward
                .iter()
                .map(|block| block.iter().map(|v| quantity(v)).collect::<Result<_, _>>())
                .collect::<Result<_, _>>()?,
        })
    }
}

impl RawReceipt {
    fn into_domain(self) -> Result<TxReceipt, NodeError> {
        let logs = self
            .logs
            .into_iter()
            .map(|log| {
                Ok(LogEntry {
                    address: log.address,
                    topics: log.topics.iter().map(|t| data(t)).collect::<Result<_, NodeError>>()?,
                    data: data(&log.data)?,
                })
            })
            .collect::<Result<_, NodeError>>()?;

        Ok(TxReceipt {
            tx_hash: self.transaction_hash,
            success: self.status.as_deref().map(quantity).transpose()? == Some(1),
            gas_used: quantity_u64(&self.gas_used)?,
            block_number: quantity_u64(&self.block_number)?,
            logs,
        })
    }
}

/// Map a JSON-RPC error object onto the node error taxonomy
fn classify_rpc_error(error: RpcErrorBody) -> NodeError {
    let message = error.message.to_lowercase();
    if error.code == 3 || message.contains("execution reverted") {
        let detail = match error.data {
            Some(Value::String(data)) => data,
            _ => error.message,
        };
        return NodeError::Reverted(detail);
    }
    if error.code == -32005 || message.contains("rate limit") || message.contains("too many requests") {
        return NodeError::RateLimited;
    }
    NodeError::Rpc {
        code: error.code,
        message: error.message,
    }
}

/// One remote node reached over HTTP JSON-RPC 2.0
pub struct JsonRpcNode {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcNode {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NodeError::RateLimited);
        }
        if !status.is_success() {
            return Err(NodeError::Transport(format!("HTTP {} from {}", status, method)));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| NodeError::InvalidResponse(e.to_string()))?;
        if let Some(error) = envelope.error {
            return Err(classify_rpc_error(error));
        }
        serde_json::from_value(envelope.result)
            .map_err(|e| NodeError::InvalidResponse(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl ChainNode for JsonRpcNode {
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, NodeError> {
        let mut tx = json!({
            "to": request.to,
            "data": encode_hex_data(&request.data),
        });
        if let Some(from) = &request.from {
            tx["from"] = json!(from);
        }
        if let Some(gas) = request.gas {
            tx["gas"] = json!(to_hex_quantity(gas as u128));
        }

        let output: String = self.request("eth_call", json!([tx, "latest"])).await?;
        data(&output)
    }

    async fn fee_history(&self, block_count: u64, percentiles: &[f64]) -> Result<FeeHistory, NodeError> {
        let raw: RawFeeHistory = self
            .request(
                "eth_feeHistory",
                json!([to_hex_quantity(block_count as u128), "latest", percentiles]),
            )
            .await?;
        raw.into_domain()
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, NodeError> {
        self.request("eth_sendRawTransaction", json!([encode_hex_data(raw)]))
            .await
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, NodeError> {
        let raw: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        raw.map(RawReceipt::into_domain).transpose()
    }

    async fn transaction_count(&self, account: &str) -> Result<u64, NodeError> {
        let count: String = self
            .request("eth_getTransactionCount", json!([account, "pending"]))
            .await?;
        quantity_u64(&count)
    }

    async fn mined_transaction_count(&self, account: &str) -> Result<u64, NodeError> {
        let count: String = self
            .request("eth_getTransactionCount", json!([account, "latest"]))
            .await?;
        quantity_u64(&count)
    }
}
