//! Utility functions and helpers

use chrono::{DateTime, Utc};
use sha3::{Digest, Keccak256};
use std::time::Duration;

/// Generate unique ID
pub fn generate_id() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

/// Parse a JSON-RPC hex quantity ("0x1a") into an integer
pub fn parse_hex_quantity(value: &str) -> Result<u128, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| format!("quantity '{}' is missing 0x prefix", value))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| format!("bad quantity '{}': {}", value, e))
}

/// Format an integer as a JSON-RPC hex quantity
pub fn to_hex_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Decode 0x-prefixed hex data
pub fn decode_hex_data(value: &str) -> Result<Vec<u8>, String> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| format!("bad hex data: {}", e))
}

/// Encode bytes as 0x-prefixed hex data
pub fn encode_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Keccak-256 of `bytes` as 0x-prefixed hex, e.g. a transaction hash
pub fn keccak_hex(bytes: &[u8]) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    encode_hex_data(&hasher.finalize())
}

/// Wei to gwei
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / 1_000_000_000.0
}

/// Gwei to wei, rounded down
pub fn gwei_to_wei(gwei: f64) -> u128 {
    if !gwei.is_finite() || gwei <= 0.0 {
        return 0;
    }
    (gwei * 1_000_000_000.0) as u128
}

/// Median of a list, `None` when empty
pub fn median(values: &mut [u128]) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(values[mid - 1] / 2 + values[mid] / 2 + (values[mid - 1] % 2 + values[mid] % 2) / 2)
    } else {
        Some(values[mid])
    }
}

/// Whether data stamped at `timestamp` is still inside its `ttl` at `now`
pub fn is_fresh(timestamp: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now.signed_duration_since(timestamp) <= ttl,
        Err(_) => true,
    }
}

/// Exponential backoff delay for retry `attempt` (0-based), capped at `max`
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(max)
}
