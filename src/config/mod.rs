//! Configuration
//!
//! [`ConfigService`] is a flat key/value store, usually seeded from the
//! process environment. [`ServiceGroupOptions`] reads its `CONDUCTOR_*` keys.

use crate::error::{Result, ServiceError};
use dashmap::DashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

pub const START_TIMEOUT_KEY: &str = "CONDUCTOR_START_TIMEOUT";
pub const STOP_TIMEOUT_KEY: &str = "CONDUCTOR_STOP_TIMEOUT";
pub const HEALTH_CHECK_INTERVAL_KEY: &str = "CONDUCTOR_HEALTH_CHECK_INTERVAL";
pub const EVENT_CAPACITY_KEY: &str = "CONDUCTOR_EVENT_CAPACITY";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding every variable of the process environment
    pub fn from_env() -> Self {
        let service = Self::new();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Read a duration such as `250ms`, `30s`, `2m` or `45` (seconds)
    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>> {
        self.get(key)
            .map(|raw| {
                parse_duration(&raw).ok_or_else(|| {
                    ServiceError::invalid_config(format!("{key}: invalid duration {raw:?}"))
                })
            })
            .transpose()
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<usize>().map_err(|e| {
                    ServiceError::invalid_config_with(format!("{key}: invalid number {raw:?}"), e)
                })
            })
            .transpose()
    }
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigService")
            .field("keys", &self.config.len())
            .finish()
    }
}

fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Some(ms) = raw.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = raw.strip_suffix('s') {
        return secs.trim().parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = raw.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs);
    }
    raw.parse().ok().map(Duration::from_secs)
}

/// Tunables of a [`ServiceGroup`](crate::group::ServiceGroup)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroupOptions {
    /// Budget for the whole `start()` call
    pub start_timeout: Duration,
    /// Budget for `stop()` and `graceful_stop()`
    pub stop_timeout: Duration,
    /// Period of the background health check. Zero disables it.
    pub health_check_interval: Duration,
    /// Events buffered per listener before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for ServiceGroupOptions {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(30),
            event_capacity: 1024,
        }
    }
}

impl ServiceGroupOptions {
    /// Defaults overridden by any `CONDUCTOR_*` keys present in `config`
    pub fn from_config(config: &ConfigService) -> Result<Self> {
        let mut options = Self::default();
        if let Some(timeout) = config.get_duration(START_TIMEOUT_KEY)? {
            options.start_timeout = timeout;
        }
        if let Some(timeout) = config.get_duration(STOP_TIMEOUT_KEY)? {
            options.stop_timeout = timeout;
        }
        if let Some(interval) = config.get_duration(HEALTH_CHECK_INTERVAL_KEY)? {
            options.health_check_interval = interval;
        }
        if let Some(capacity) = config.get_usize(EVENT_CAPACITY_KEY)? {
            if capacity == 0 {
                return Err(ServiceError::invalid_config(format!(
                    "{EVENT_CAPACITY_KEY} must be at least 1"
                )));
            }
            options.event_capacity = capacity;
        }
        Ok(options)
    }

    /// [`from_config`](Self::from_config) over the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_config(&ConfigService::from_env())
    }
}
