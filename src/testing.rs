//! Scripted collaborators shared by unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::domain::endpoint::{CallRequest, ChainNode, FeeHistory, TxReceipt};
use crate::domain::price::{PriceSource, SourcePrice};
use crate::shared::errors::{NodeError, SourceError};

#[derive(Default)]
struct NodeScript {
    call: VecDeque<Result<Vec<u8>, NodeError>>,
    call_default: Option<Result<Vec<u8>, NodeError>>,
    fee_history: VecDeque<Result<FeeHistory, NodeError>>,
    send: VecDeque<Result<String, NodeError>>,
    receipt: VecDeque<Result<Option<TxReceipt>, NodeError>>,
    count: VecDeque<Result<u64, NodeError>>,
    mined_count: VecDeque<Result<u64, NodeError>>,
    calls: HashMap<&'static str, usize>,
    sent: Vec<Vec<u8>>,
    requests: Vec<CallRequest>,
}

/// Chain node answering from per-method queues
#[derive(Default)]
pub struct MockNode {
    script: Mutex<NodeScript>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_call(&self, result: Result<Vec<u8>, NodeError>) {
        self.script.lock().call.push_back(result);
    }

    pub fn set_call_default(&self, result: Result<Vec<u8>, NodeError>) {
        self.script.lock().call_default = Some(result);
    }

    pub fn push_fee_history(&self, result: Result<FeeHistory, NodeError>) {
        self.script.lock().fee_history.push_back(result);
    }

    pub fn push_send(&self, result: Result<String, NodeError>) {
        self.script.lock().send.push_back(result);
    }

    pub fn push_receipt(&self, result: Result<Option<TxReceipt>, NodeError>) {
        self.script.lock().receipt.push_back(result);
    }

    pub fn push_count(&self, result: Result<u64, NodeError>) {
        self.script.lock().count.push_back(result);
    }

    pub fn push_mined_count(&self, result: Result<u64, NodeError>) {
        self.script.lock().mined_count.push_back(result);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.script.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.script.lock().sent.clone()
    }

    pub fn requests(&self) -> Vec<CallRequest> {
        self.script.lock().requests.clone()
    }

    fn bump(script: &mut NodeScript, method: &'static str) {
        *script.calls.entry(method).or_insert(0) += 1;
    }
}

#[async_trait]
impl ChainNode for MockNode {
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, NodeError> {
        let mut script = self.script.lock();
        Self::bump(&mut script, "call");
        script.requests.push(request.clone());
        match script.call.pop_front() {
            Some(result) => result,
            None => script
                .call_default
                .clone()
                .unwrap_or_else(|| Err(NodeError::Transport("unscripted call".into()))),
        }
    }

    async fn fee_history(&self, _block_count: u64, _percentiles: &[f64]) -> Result<FeeHistory, NodeError> {
        let mut script = self.script.lock();
        Self::bump(&mut script, "fee_history");
        script
            .fee_history
            .pop_front()
            .unwrap_or_else(|| Err(NodeError::Transport("unscripted fee_history".into())))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, NodeError> {
        let mut script = self.script.lock();
        Self::bump(&mut script, "send_raw_transaction");
        script.sent.push(raw.to_vec());
        script.send.pop_front().unwrap_or_else(|| Ok("0xfeed".to_string()))
    }

    async fn transaction_receipt(&self, _tx_hash: &str) -> Result<Option<TxReceipt>, NodeError> {
        let mut script = self.script.lock();
        Self::bump(&mut script, "transaction_receipt");
        script.receipt.pop_front().unwrap_or(Ok(None))
    }

    async fn transaction_count(&self, _account: &str) -> Result<u64, NodeError> {
        let mut script = self.script.lock();
        Self::bump(&mut script, "transaction_count");
        script.count.pop_front().unwrap_or(Ok(0))
    }

    async fn mined_transaction_count(&self, _account: &str) -> Result<u64, NodeError> {
        let mut script = self.script.lock();
        Self::bump(&mut script, "mined_transaction_count");
        script.mined_count.pop_front().unwrap_or(Ok(0))
    }
}

/// Price source answering from a queue per ticker
pub struct MockPriceSource {
    id: String,
    answers: Mutex<HashMap<String, VecDeque<Result<SourcePrice, SourceError>>>>,
    calls: Mutex<usize>,
}

impl MockPriceSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            answers: Mutex::new(HashMap::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn push(&self, ticker: &str, result: Result<SourcePrice, SourceError>) {
        self.answers
            .lock()
            .entry(ticker.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn push_price(&self, ticker: &str, price: f64, timestamp: DateTime<Utc>) {
        self.push(ticker, Ok(SourcePrice { price, timestamp }));
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_price(&self, ticker: &str) -> Result<SourcePrice, SourceError> {
        *self.calls.lock() += 1;
        self.answers
            .lock()
            .get_mut(ticker)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(SourceError::Transport(format!("unscripted ticker {}", ticker))))
    }
}
