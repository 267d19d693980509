//! ABI binding for the deployed flash-loan arbitrage contract

use ethabi::{Address, Contract, Event, Function, Hash, RawLog, Token, Uint};

use crate::domain::endpoint::LogEntry;
use crate::domain::execution::{ExecutionPlan, FlashLoanContract};
use crate::shared::errors::ExecutionError;

const ABI: &str = r#"[
  {
    "type": "function",
    "name": "executeArbitrage",
    "stateMutability": "nonpayable",
    "inputs": [
      { "name": "asset", "type": "address" },
      { "name": "amount", "type": "uint256" },
      { "name": "path", "type": "address[]" },
      { "name": "minProfit", "type": "uint256" },
      { "name": "deadline", "type": "uint256" }
    ],
    "outputs": [{ "name": "profit", "type": "uint256" }]
  },
  {
    "type": "event",
    "name": "ArbitrageExecuted",
    "anonymous": false,
    "inputs": [
      { "name": "asset", "type": "address", "indexed": true },
      { "name": "amount", "type": "uint256", "indexed": false },
      { "name": "profit", "type": "uint256", "indexed": false }
    ]
  }
]"#;

fn contract_error(e: impl std::fmt::Display) -> ExecutionError {
    ExecutionError::Contract(e.to_string())
}

fn parse_address(value: &str) -> Result<Address, ExecutionError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    digits
        .parse::<Address>()
        .map_err(|e| ExecutionError::Contract(format!("bad address '{}': {}", value, e)))
}

fn uint_to_u128(value: Uint) -> Result<u128, ExecutionError> {
    if value.bits() > 128 {
        return Err(ExecutionError::Contract(format!("profit {} overflows u128", value)));
    }
    Ok(value.low_u128())
}

/// `executeArbitrage(asset, amount, path, minProfit, deadline)` and its event
pub struct FlashArbContract {
    address: String,
    execute: Function,
    executed: Event,
}

impl FlashArbContract {
    pub fn new(address: impl Into<String>) -> Result<Self, ExecutionError> {
        let abi = Contract::load(ABI.as_bytes()).map_err(contract_error)?;
        let execute = abi.function("executeArbitrage").map_err(contract_error)?.clone();
        let executed = abi.event("ArbitrageExecuted").map_err(contract_error)?.clone();
        Ok(Self {
            address: address.into(),
            execute,
            executed,
        })
    }

    fn event_topic(&self) -> Hash {
        self.executed.signature()
    }
}

impl FlashLoanContract for FlashArbContract {
    fn address(&self) -> &str {
        &self.address
    }

    fn encode_execute(&self, plan: &ExecutionPlan) -> Result<Vec<u8>, ExecutionError> {
        let path = plan
            .route
            .path
            .iter()
            .map(|hop| parse_address(hop).map(Token::Address))
            .collect::<Result<Vec<_>, _>>()?;
        let deadline = u64::try_from(plan.deadline.timestamp()).unwrap_or(0);

        self.execute
            .encode_input(&[
                Token::Address(parse_address(&plan.borrow_asset.address)?),
                Token::Uint(Uint::from(plan.borrow_amount)),
                Token::Array(path),
                Token::Uint(Uint::from(plan.min_profit_units())),
                Token::Uint(Uint::from(deadline)),
            ])
            .map_err(contract_error)
    }

    fn decode_profit(&self, output: &[u8]) -> Result<u128, ExecutionError> {
        let tokens = self.execute.decode_output(output).map_err(contract_error)?;
        let profit = tokens
            .into_iter()
            .next()
            .and_then(Token::into_uint)
            .ok_or_else(|| ExecutionError::Contract("missing profit output".to_string()))?;
        uint_to_u128(profit)
    }

    fn profit_from_logs(&self, logs: &[LogEntry]) -> Option<u128> {
        let topic = self.event_topic();
        logs.iter()
            .filter(|log| log.address.eq_ignore_ascii_case(&self.address))
            .filter(|log| log.topics.first().map(|t| t.as_slice()) == Some(topic.as_bytes()))
            .find_map(|log| {
                if log.topics.iter().any(|t| t.len() != 32) {
                    return None;
                }
                let raw = RawLog {
                    topics: log.topics.iter().map(|t| Hash::from_slice(t)).collect(),
                    data: log.data.clone(),
                };
                let parsed = self.executed.parse_log(raw).ok()?;
                parsed
                    .params
                    .into_iter()
                    .find(|param| param.name == "profit")
                    .and_then(|param| param.value.into_uint())
                    .and_then(|value| uint_to_u128(value).ok())
            })
    }
}
