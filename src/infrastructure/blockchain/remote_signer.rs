//! External signer reached over JSON-RPC (`eth_signTransaction`)

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::endpoint::UnsignedTransaction;
use crate::domain::execution::TransactionSigner;
use crate::shared::errors::ExecutionError;
use crate::shared::utils::{decode_hex_data, encode_hex_data, to_hex_quantity};

/// Signs EIP-1559 transactions via a Clef/web3signer style endpoint
pub struct RemoteSigner {
    url: String,
    client: reqwest::Client,
}

impl RemoteSigner {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Signing(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

fn transaction_params(tx: &UnsignedTransaction) -> Value {
    json!({
        "type": "0x2",
        "chainId": to_hex_quantity(u128::from(tx.chain_id)),
        "from": tx.from,
        "to": tx.to,
        "data": encode_hex_data(&tx.data),
        "nonce": to_hex_quantity(u128::from(tx.nonce)),
        "gas": to_hex_quantity(u128::from(tx.gas_limit)),
        "maxFeePerGas": to_hex_quantity(tx.max_fee_per_gas),
        "maxPriorityFeePerGas": to_hex_quantity(tx.max_priority_fee_per_gas),
        "value": "0x0",
    })
}

/// Signers answer either with the raw hex or with `{ raw, tx }`
fn extract_raw(result: &Value) -> Result<Vec<u8>, ExecutionError> {
    let raw = match result {
        Value::String(raw) => raw.as_str(),
        Value::Object(fields) => fields
            .get("raw")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecutionError::Signing("signer response has no raw field".to_string()))?,
        other => return Err(ExecutionError::Signing(format!("unexpected signer response: {}", other))),
    };
    let bytes = decode_hex_data(raw).map_err(ExecutionError::Signing)?;
    if bytes.is_empty() {
        return Err(ExecutionError::Signing("signer returned an empty transaction".to_string()));
    }
    Ok(bytes)
}

#[async_trait]
impl TransactionSigner for RemoteSigner {
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, ExecutionError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_signTransaction",
            "params": [transaction_params(tx)],
        });

        let response: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutionError::Signing(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExecutionError::Signing(e.to_string()))?
            .json()
            .await
            .map_err(|e| ExecutionError::Signing(e.to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(ExecutionError::Signing(error.to_string()));
        }
        debug!("Signed transaction nonce {} for {}", tx.nonce, tx.from);
        extract_raw(response.get("result").unwrap_or(&Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_params() {
        let tx = UnsignedTransaction {
            chain_id: 1,
            from: "0x01".to_string(),
            to: "0x02".to_string(),
            data: vec![0xab, 0xcd],
            nonce: 7,
            gas_limit: 600_000,
            max_fee_per_gas: 41_500_000_000,
            max_priority_fee_per_gas: 1_500_000_000,
        };
        let params = transaction_params(&tx);
        assert_eq!(params["nonce"], "0x7");
        assert_eq!(params["gas"], "0x927c0");
        assert_eq!(params["data"], "0xabcd");
        assert_eq!(params["maxPriorityFeePerGas"], "0x59682f00");
    }

    #[test]
    fn test_extract_raw() {
        assert_eq!(extract_raw(&json!("0x02f8")).unwrap(), vec![0x02, 0xf8]);
        assert_eq!(
            extract_raw(&json!({ "raw": "0x02f9", "tx": {} })).unwrap(),
            vec![0x02, 0xf9]
        );
        assert!(extract_raw(&json!({ "tx": {} })).is_err());
        assert!(extract_raw(&json!("0x")).is_err());
        assert!(extract_raw(&Value::Null).is_err());
    }
}
