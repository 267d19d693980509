//! Error handling for the application

use thiserror::Error;

use crate::shared::types::{ChainId, Pair};

/// Coarse classification inspected at each component's recovery point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientNetwork,
    RateLimit,
    StaleQuote,
    InsufficientLiquidity,
    SimulationRejected,
    GasPriceExceeded,
    CircuitOpen,
    InFlightConflict,
    Fatal,
}

/// Errors returned by a single chain node call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node rate limited the request")]
    RateLimited,

    #[error("Invalid node response: {0}")]
    InvalidResponse(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Execution reverted: {0}")]
    Reverted(String),
}

impl NodeError {
    /// Whether the failure says something about the endpoint itself.
    /// RPC errors and reverts are answers from a working node.
    pub fn is_endpoint_fault(&self) -> bool {
        matches!(
            self,
            NodeError::Transport(_) | NodeError::RateLimited | NodeError::InvalidResponse(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Transport(_) | NodeError::InvalidResponse(_) => ErrorKind::TransientNetwork,
            NodeError::RateLimited => ErrorKind::RateLimit,
            NodeError::Rpc { .. } => ErrorKind::Fatal,
            NodeError::Reverted(_) => ErrorKind::SimulationRejected,
        }
    }
}

/// Endpoint pool errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EndpointError {
    #[error("No usable endpoint for chain {chain}: all circuits open")]
    CircuitOpen { chain: ChainId },

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: NodeError },

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl EndpointError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EndpointError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            EndpointError::Exhausted { last, .. } => last.kind(),
            EndpointError::Node(err) => err.kind(),
        }
    }
}

/// Price source adapter errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::RateLimited => ErrorKind::RateLimit,
            _ => ErrorKind::TransientNetwork,
        }
    }
}

/// Price-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceError {
    #[error("No price available for {pair} ({} sources tried)", attempts.len())]
    NoPriceAvailable {
        pair: Pair,
        attempts: Vec<(String, String)>,
    },

    #[error("Unknown pair: {0}")]
    UnknownPair(Pair),

    #[error("Cross rate for {0} derives from itself")]
    CycleDetected(Pair),

    #[error("Cross route for {pair} is broken: {reason}")]
    InvalidCrossRoute { pair: Pair, reason: String },

    #[error("Quote for {0} is stale")]
    StaleQuote(Pair),

    #[error("Insufficient liquidity for {0}")]
    InsufficientLiquidity(Pair),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl PriceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PriceError::StaleQuote(_) => ErrorKind::StaleQuote,
            PriceError::InsufficientLiquidity(_) => ErrorKind::InsufficientLiquidity,
            PriceError::Endpoint(err) => err.kind(),
            PriceError::NoPriceAvailable { .. } => ErrorKind::TransientNetwork,
            _ => ErrorKind::Fatal,
        }
    }
}

/// Execution-related errors. A terminal on-chain outcome is not an error:
/// it is reported as an `ExecutionResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Opportunity is not executable")]
    NotExecutable,

    #[error("Another plan is in flight for {chain}/{account}")]
    InFlightConflict { chain: ChainId, account: String },

    #[error("No route configured for {0}")]
    NoRoute(String),

    #[error("Route {0} is blacklisted")]
    RouteBlacklisted(String),

    #[error("Execution halted: {0}")]
    Halted(String),

    #[error("Shutdown in progress")]
    ShuttingDown,

    #[error("Gas price {gwei:.2} gwei above cap {cap:.2} gwei")]
    GasPriceExceeded { gwei: f64, cap: f64 },

    #[error("No fresh fee estimate to check against the gas cap")]
    StaleFeeEstimate,

    #[error("Plan deadline passed")]
    DeadlineExpired,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Contract encoding error: {0}")]
    Contract(String),

    #[error("Illegal stage transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::InFlightConflict { .. } => ErrorKind::InFlightConflict,
            ExecutionError::GasPriceExceeded { .. } => ErrorKind::GasPriceExceeded,
            ExecutionError::StaleFeeEstimate => ErrorKind::StaleQuote,
            ExecutionError::Endpoint(err) => err.kind(),
            ExecutionError::Halted(_) | ExecutionError::InvalidTransition { .. } => ErrorKind::Fatal,
            _ => ErrorKind::SimulationRejected,
        }
    }
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}
