//! Temporary route blacklist driven by simulation rejections and reverts

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    /// Simulation rejections inside `rejection_window` that blacklist a route
    pub rejection_limit: usize,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub rejection_window: Duration,
    /// Consecutive on-chain reverts that blacklist a route
    pub revert_limit: u32,
    #[serde(with = "crate::shared::config::duration_ms")]
    pub cooldown: Duration,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            rejection_limit: 3,
            rejection_window: Duration::from_secs(300),
            revert_limit: 3,
            cooldown: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Default)]
struct RouteRecord {
    rejections: VecDeque<Instant>,
    consecutive_reverts: u32,
    blacklisted_until: Option<Instant>,
}

impl RouteRecord {
    fn is_blacklisted(&mut self, now: Instant) -> bool {
        match self.blacklisted_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.blacklisted_until = None;
                false
            }
            None => false,
        }
    }
}

pub struct RouteBlacklist {
    config: BlacklistConfig,
    routes: Mutex<HashMap<String, RouteRecord>>,
}

impl RouteBlacklist {
    pub fn new(config: BlacklistConfig) -> Self {
        Self {
            config,
            routes: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_blacklisted(&self, route_id: &str, now: Instant) -> bool {
        self.routes
            .lock()
            .get_mut(route_id)
            .map_or(false, |record| record.is_blacklisted(now))
    }

    /// True when there is at least one route and none of them is usable
    pub fn all_blacklisted<'a>(&self, route_ids: impl IntoIterator<Item = &'a str>, now: Instant) -> bool {
        let mut routes = self.routes.lock();
        let mut any = false;
        for id in route_ids {
            any = true;
            match routes.get_mut(id) {
                Some(record) => {
                    if !record.is_blacklisted(now) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        any
    }

    /// Returns true when this rejection blacklisted the route
    pub fn record_simulation_rejected(&self, route_id: &str, now: Instant) -> bool {
        let mut routes = self.routes.lock();
        let record = routes.entry(route_id.to_string()).or_default();

        while let Some(&oldest) = record.rejections.front() {
            if now.saturating_duration_since(oldest) > self.config.rejection_window {
                record.rejections.pop_front();
            } else {
                break;
            }
        }
        record.rejections.push_back(now);

        if record.rejections.len() >= self.config.rejection_limit {
            record.rejections.clear();
            record.blacklisted_until = Some(now + self.config.cooldown);
            warn!(
                "Route {} blacklisted for {:?} after {} simulation rejections",
                route_id, self.config.cooldown, self.config.rejection_limit
            );
            return true;
        }
        false
    }

    /// Returns true when this revert blacklisted the route
    pub fn record_revert(&self, route_id: &str, now: Instant) -> bool {
        let mut routes = self.routes.lock();
        let record = routes.entry(route_id.to_string()).or_default();

        record.consecutive_reverts += 1;
        if record.consecutive_reverts >= self.config.revert_limit {
            record.consecutive_reverts = 0;
            record.blacklisted_until = Some(now + self.config.cooldown);
            warn!(
                "Route {} blacklisted for {:?} after {} consecutive reverts",
                route_id, self.config.cooldown, self.config.revert_limit
            );
            return true;
        }
        false
    }

    pub fn record_confirmed(&self, route_id: &str) {
        if let Some(record) = self.routes.lock().get_mut(route_id) {
            record.consecutive_reverts = 0;
            record.rejections.clear();
        }
    }
}
