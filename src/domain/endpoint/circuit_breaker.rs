//! Circuit breaker state machine for a single endpoint
//!
//! All transitions take an explicit `now` so the pool decides what the clock
//! is. The breaker itself is not synchronized; the owning endpoint keeps it
//! behind a mutex.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing - requests are rejected
    Open,
    /// Cooldown elapsed - a single probe is allowed
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// A failure streak older than this starts over
    #[serde(with = "crate::shared::config::duration_ms")]
    pub failure_window: Duration,
    /// Cooldown after the first trip
    #[serde(with = "crate::shared::config::duration_ms")]
    pub base_cooldown: Duration,
    /// Upper bound for the backed-off cooldown
    #[serde(with = "crate::shared::config::duration_ms")]
    pub max_cooldown: Duration,
    pub backoff_multiplier: f64,
    /// Cooldown is scaled by a uniform factor in [1 - ratio, 1 + ratio]
    pub jitter_ratio: f64,
    /// EWMA weight of the latest outcome in the health score
    pub health_alpha: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            base_cooldown: Duration::from_secs(5),
            max_cooldown: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.2,
            health_alpha: 0.2,
        }
    }
}

/// What the breaker granted to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    Probe,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    streak_started: Option<Instant>,
    opened_at: Option<Instant>,
    /// First trip of the current outage; not moved by failed probes
    tripped_at: Option<Instant>,
    cooldown: Duration,
    reopen_count: u32,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let cooldown = config.base_cooldown;
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            streak_started: None,
            opened_at: None,
            tripped_at: None,
            cooldown,
            reopen_count: 0,
            probe_in_flight: false,
        }
    }

    /// Current state, moving OPEN to HALF_OPEN once the cooldown is over
    pub fn state_at(&mut self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open {
            if let Some(opened) = self.opened_at {
                if now.saturating_duration_since(opened) >= self.cooldown {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = false;
                    tracing::info!("Circuit breaker transitioning to half-open");
                }
            }
        }
        self.state
    }

    /// Ask for permission to dispatch a call
    pub fn try_admit(&mut self, now: Instant) -> Option<Admission> {
        match self.state_at(now) {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::HalfOpen if !self.probe_in_flight => {
                self.probe_in_flight = true;
                Some(Admission::Probe)
            }
            _ => None,
        }
    }

    /// Give back a probe slot whose call never reported an outcome
    pub fn release_probe(&mut self) {
        self.probe_in_flight = false;
    }

    /// Only the probe's own success closes a HALF_OPEN circuit
    pub fn on_success(&mut self, admission: Admission) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.streak_started = None;
            }
            CircuitState::HalfOpen if admission == Admission::Probe => {
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
                self.streak_started = None;
                self.opened_at = None;
                self.tripped_at = None;
                self.reopen_count = 0;
                self.cooldown = self.config.base_cooldown;
                self.probe_in_flight = false;
                tracing::info!("Circuit breaker closed after successful probe");
            }
            // late answer from a call dispatched before the trip
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    pub fn on_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::Closed => {
                let streak_expired = self
                    .streak_started
                    .map(|start| now.saturating_duration_since(start) > self.config.failure_window)
                    .unwrap_or(true);
                if streak_expired {
                    self.streak_started = Some(now);
                    self.consecutive_failures = 1;
                } else {
                    self.consecutive_failures += 1;
                }

                if self.consecutive_failures >= self.config.failure_threshold {
                    self.tripped_at = Some(now);
                    self.trip(now);
                    tracing::warn!(
                        "Circuit breaker opened after {} failures, cooldown {:?}",
                        self.consecutive_failures,
                        self.cooldown
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.reopen_count = self.reopen_count.saturating_add(1);
                self.consecutive_failures += 1;
                self.probe_in_flight = false;
                self.trip(now);
                tracing::warn!("Circuit breaker reopened after failed probe, cooldown {:?}", self.cooldown);
            }
            CircuitState::Open => {
                self.consecutive_failures += 1;
            }
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.cooldown = self.next_cooldown();
    }

    /// base * multiplier^reopens, capped, then jittered and capped again
    fn next_cooldown(&self) -> Duration {
        let exponent = self.reopen_count.min(32) as i32;
        let base = self.config.base_cooldown.as_secs_f64() * self.config.backoff_multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.config.max_cooldown.as_secs_f64());

        let ratio = self.config.jitter_ratio.clamp(0.0, 1.0);
        let factor = if ratio > 0.0 {
            1.0 + rand::thread_rng().gen_range(-ratio..=ratio)
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * factor).max(0.0)).min(self.config.max_cooldown)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn tripped_at(&self) -> Option<Instant> {
        self.tripped_at
    }
}
