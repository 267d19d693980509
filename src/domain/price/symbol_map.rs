//! Per-source ticker translation table

use std::collections::HashMap;

use crate::shared::types::Pair;

/// Lookup of `(source, pair)` to the ticker that source uses
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    tickers: HashMap<(String, Pair), String>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, pair: Pair, ticker: impl Into<String>) {
        self.tickers.insert((source.into(), pair), ticker.into());
    }

    pub fn ticker(&self, source: &str, pair: &Pair) -> Option<&str> {
        self.tickers
            .get(&(source.to_string(), pair.clone()))
            .map(String::as_str)
    }

    /// Whether any source quotes the pair directly
    pub fn is_listed(&self, pair: &Pair) -> bool {
        self.tickers.keys().any(|(_, p)| p == pair)
    }
}
