//! Prioritized multi-source price aggregation with per-source caching

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::cross_rate::CrossRoute;
use super::price_source::PriceSource;
use super::symbol_map::SymbolMap;
use super::PriceQuote;
use crate::shared::errors::{PriceError, SourceError};
use crate::shared::types::Pair;

/// Per-source knobs
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Lower is tried first
    pub priority: u32,
    pub requests_per_minute: u32,
    pub cache_ttl: Duration,
    /// How long to leave a source alone after it reports a rate limit
    pub rate_limit_backoff: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            priority: 0,
            requests_per_minute: 600,
            cache_ttl: Duration::from_secs(5),
            rate_limit_backoff: Duration::from_secs(30),
        }
    }
}

struct SourceSlot {
    source: Arc<dyn PriceSource>,
    settings: SourceSettings,
    limiter: Option<DefaultDirectRateLimiter>,
    backoff_until: Mutex<Option<Instant>>,
}

impl SourceSlot {
    fn backing_off(&self, now: Instant) -> bool {
        matches!(*self.backoff_until.lock(), Some(until) if now < until)
    }
}

/// Price aggregator over a fallback cascade of sources
pub struct PriceAggregator {
    slots: Vec<SourceSlot>,
    symbols: SymbolMap,
    cross_routes: HashMap<Pair, CrossRoute>,
    cache: RwLock<HashMap<(String, Pair), PriceQuote>>,
    /// Tolerated clock difference for source timestamps in the future
    max_clock_skew: Duration,
}

impl PriceAggregator {
    pub fn new(symbols: SymbolMap) -> Self {
        Self {
            slots: Vec::new(),
            symbols,
            cross_routes: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
            max_clock_skew: Duration::from_secs(2),
        }
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn PriceSource>, settings: SourceSettings) {
        let limiter = NonZeroU32::new(settings.requests_per_minute)
            .map(|rate| DefaultDirectRateLimiter::direct(Quota::per_minute(rate)));
        if limiter.is_none() {
            warn!("Price source {} has no rate limit configured", source.id());
        }

        self.slots.push(SourceSlot {
            source,
            settings,
            limiter,
            backoff_until: Mutex::new(None),
        });
        self.slots.sort_by_key(|slot| slot.settings.priority);
    }

    /// Register a synthetic pair derived from `legs`
    pub fn add_cross_route(&mut self, target: Pair, legs: Vec<Pair>) -> Result<(), PriceError> {
        let route = CrossRoute::new(target.clone(), legs)?;
        self.cross_routes.insert(target, route);
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.source.id()).collect()
    }

    /// Freshest trustworthy price for a pair, or an error. Never a stale or
    /// made-up value.
    pub async fn get_price(&self, pair: &Pair) -> Result<PriceQuote, PriceError> {
        self.resolve(pair.clone(), Vec::new()).await
    }

    fn resolve<'a>(&'a self, pair: Pair, stack: Vec<Pair>) -> BoxFuture<'a, Result<PriceQuote, PriceError>> {
        async move {
            if stack.contains(&pair) {
                return Err(PriceError::CycleDetected(pair));
            }

            let listed = self.symbols.is_listed(&pair);
            let direct = if listed { Some(self.fetch_direct(&pair).await) } else { None };

            match (direct, self.cross_routes.get(&pair)) {
                (Some(Ok(quote)), _) => Ok(quote),
                (direct, Some(route)) => {
                    if let Some(Err(err)) = &direct {
                        debug!("Direct price for {} unavailable ({}), deriving cross rate", pair, err);
                    }
                    let mut stack = stack;
                    stack.push(pair.clone());
                    let mut legs = Vec::new();
                    for leg in route.legs() {
                        legs.push(self.resolve(leg.clone(), stack.clone()).await?);
                    }
                    route.combine(&legs).ok_or_else(|| PriceError::InvalidCrossRoute {
                        pair: pair.clone(),
                        reason: "leg quotes do not match route".to_string(),
                    })
                }
                (Some(Err(err)), None) => Err(err),
                (None, None) => Err(PriceError::UnknownPair(pair)),
            }
        }
        .boxed()
    }

    /// Walk the cascade: fresh cache, then a live fetch, per source in priority order
    async fn fetch_direct(&self, pair: &Pair) -> Result<PriceQuote, PriceError> {
        let mut attempts = Vec::new();

        for slot in &self.slots {
            let source_id = slot.source.id();
            let Some(ticker) = self.symbols.ticker(source_id, pair) else {
                continue;
            };

            if let Some(quote) = self.cached(source_id, pair) {
                debug!("Cache hit for {} from {}", pair, source_id);
                return Ok(quote);
            }

            if slot.backing_off(Instant::now()) {
                attempts.push((source_id.to_string(), "backing off after rate limit".to_string()));
                continue;
            }
            if let Some(limiter) = &slot.limiter {
                if limiter.check().is_err() {
                    attempts.push((source_id.to_string(), "local rate limit".to_string()));
                    continue;
                }
            }

            match slot.source.get_price(ticker).await {
                Ok(raw) => match self.validate(pair, source_id, raw.price, raw.timestamp, &slot.settings) {
                    Ok(quote) => {
                        self.store(quote.clone());
                        return Ok(quote);
                    }
                    Err(reason) => {
                        debug!("Rejected price for {} from {}: {}", pair, source_id, reason);
                        attempts.push((source_id.to_string(), reason));
                    }
                },
                Err(err) => {
                    if err == SourceError::RateLimited {
                        *slot.backoff_until.lock() = Some(Instant::now() + slot.settings.rate_limit_backoff);
                    }
                    debug!("Price source {} failed for {}: {}", source_id, pair, err);
                    attempts.push((source_id.to_string(), err.to_string()));
                }
            }
        }

        warn!("No price available for {} after {} attempts", pair, attempts.len());
        Err(PriceError::NoPriceAvailable {
            pair: pair.clone(),
            attempts,
        })
    }

    fn validate(
        &self,
        pair: &Pair,
        source: &str,
        price: f64,
        timestamp: chrono::DateTime<Utc>,
        settings: &SourceSettings,
    ) -> Result<PriceQuote, String> {
        if !price.is_finite() || price <= 0.0 {
            return Err(format!("non-positive price {}", price));
        }

        let now = Utc::now();
        let skew = chrono::Duration::from_std(self.max_clock_skew).unwrap_or_else(|_| chrono::Duration::zero());
        if timestamp > now + skew {
            return Err(format!("timestamp {} is in the future", timestamp));
        }

        let quote = PriceQuote {
            pair: pair.clone(),
            source: source.to_string(),
            price,
            timestamp,
            ttl: settings.cache_ttl,
        };
        if !quote.is_fresh_at(now) {
            return Err("stale at arrival".to_string());
        }
        Ok(quote)
    }

    fn cached(&self, source: &str, pair: &Pair) -> Option<PriceQuote> {
        let now = Utc::now();
        self.cache
            .read()
            .get(&(source.to_string(), pair.clone()))
            .filter(|quote| quote.is_fresh_at(now))
            .cloned()
    }

    fn store(&self, quote: PriceQuote) {
        let now = Utc::now();
        let mut cache = self.cache.write();
        cache.retain(|_, cached| cached.is_fresh_at(now));
        cache.insert((quote.source.clone(), quote.pair.clone()), quote);
    }
}
