//! Endpoint domain - remote node pool, circuit breakers and health scoring

mod chain_node;
mod circuit_breaker;
mod endpoint_pool;

pub use chain_node::{CallRequest, ChainNode, FeeHistory, LogEntry, TxReceipt, UnsignedTransaction};
pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use endpoint_pool::{Endpoint, EndpointLease, EndpointPool, EndpointRegistry, EndpointSnapshot, PoolConfig};
