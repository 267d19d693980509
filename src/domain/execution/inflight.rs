//! At most one plan in flight per (chain, account)

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::shared::errors::ExecutionError;
use crate::shared::types::ChainId;

/// What a second request for a busy account does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum InFlightPolicy {
    /// Drop the request
    #[default]
    Reject,
    /// Queue behind the running plan for up to `timeout_ms`
    Wait { timeout_ms: u64 },
}

/// A submitted transaction whose outcome was never observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub tx_hash: String,
    pub nonce: u64,
    pub route_id: String,
}

/// Held for the whole life of an attempt; dropping it frees the account
pub struct InFlightGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Shared registry of per-account slots. An account with an unsettled
/// submission stays blocked after its slot is released.
#[derive(Default)]
pub struct InFlightRegistry {
    slots: Mutex<HashMap<(ChainId, String), Arc<AsyncMutex<()>>>>,
    pending: Mutex<HashMap<(ChainId, String), PendingTx>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(chain: &ChainId, account: &str) -> (ChainId, String) {
        (chain.clone(), account.to_lowercase())
    }

    fn slot(&self, chain: &ChainId, account: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.slots.lock().entry(Self::key(chain, account)).or_default())
    }

    pub async fn acquire(
        &self,
        chain: &ChainId,
        account: &str,
        policy: InFlightPolicy,
    ) -> Result<InFlightGuard, ExecutionError> {
        let slot = self.slot(chain, account);
        let conflict = || ExecutionError::InFlightConflict {
            chain: chain.clone(),
            account: account.to_string(),
        };

        let guard = match policy {
            InFlightPolicy::Reject => slot.try_lock_owned().map_err(|_| conflict())?,
            InFlightPolicy::Wait { timeout_ms } => {
                tokio::time::timeout(Duration::from_millis(timeout_ms), slot.lock_owned())
                    .await
                    .map_err(|_| conflict())?
            }
        };
        Ok(InFlightGuard { _guard: guard })
    }

    pub fn is_busy(&self, chain: &ChainId, account: &str) -> bool {
        self.slot(chain, account).try_lock().is_err()
    }

    pub fn record_pending(&self, chain: &ChainId, account: &str, tx: PendingTx) {
        self.pending.lock().insert(Self::key(chain, account), tx);
    }

    pub fn pending(&self, chain: &ChainId, account: &str) -> Option<PendingTx> {
        self.pending.lock().get(&Self::key(chain, account)).cloned()
    }

    pub fn clear_pending(&self, chain: &ChainId, account: &str) {
        self.pending.lock().remove(&Self::key(chain, account));
    }
}
