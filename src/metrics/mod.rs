//! Per-service lifecycle metrics

use crate::error::ServiceError;
use crate::state::ServiceState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Point-in-time metrics for one service
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceMetrics {
    pub start_time: Option<DateTime<Utc>>,
    pub restart_count: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub state: ServiceState,
    pub health_check_count: u64,
    pub health_check_errors: u64,
    pub last_health_check: Option<DateTime<Utc>>,
    pub total_uptime: Duration,
    pub last_state_change: Option<DateTime<Utc>>,
}

impl ServiceMetrics {
    /// Time since the last start, if the service is running
    pub fn current_uptime(&self) -> Duration {
        match (self.state, self.start_time) {
            (ServiceState::Running, Some(started)) => elapsed_since(started),
            _ => Duration::ZERO,
        }
    }
}

/// Collects [`ServiceMetrics`] for every registered service
///
/// Recording for a name that was never registered is a no-op.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: DashMap<String, ServiceMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) {
        self.metrics
            .entry(name.to_string())
            .or_insert_with(|| ServiceMetrics {
                last_state_change: Some(Utc::now()),
                ..Default::default()
            });
    }

    pub fn record_start(&self, name: &str) {
        if let Some(mut m) = self.metrics.get_mut(name) {
            let now = Utc::now();
            m.start_time = Some(now);
            m.state = ServiceState::Running;
            m.last_state_change = Some(now);
        }
    }

    /// Record a stop and add the time since the last start to the uptime
    pub fn record_stop(&self, name: &str) {
        if let Some(mut m) = self.metrics.get_mut(name) {
            if let Some(started) = m.start_time.take() {
                m.total_uptime += elapsed_since(started);
            }
            m.state = ServiceState::Stopped;
            m.last_state_change = Some(Utc::now());
        }
    }

    pub fn record_restart(&self, name: &str) {
        if let Some(mut m) = self.metrics.get_mut(name) {
            let now = Utc::now();
            m.restart_count += 1;
            m.start_time = Some(now);
            m.last_state_change = Some(now);
        }
    }

    pub fn record_error(&self, name: &str, error: &ServiceError) {
        if let Some(mut m) = self.metrics.get_mut(name) {
            let now = Utc::now();
            m.last_error = Some(error.to_string());
            m.last_error_time = Some(now);
            m.state = ServiceState::Error;
            m.last_state_change = Some(now);
        }
    }

    pub fn record_health_check(&self, name: &str, result: Result<(), &ServiceError>) {
        if let Some(mut m) = self.metrics.get_mut(name) {
            m.health_check_count += 1;
            m.last_health_check = Some(Utc::now());
            if result.is_err() {
                m.health_check_errors += 1;
            }
        }
    }

    /// A copy of one service's metrics
    pub fn get(&self, name: &str) -> Option<ServiceMetrics> {
        self.metrics.get(name).map(|m| m.clone())
    }

    pub fn all(&self) -> HashMap<String, ServiceMetrics> {
        self.metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

fn elapsed_since(start: DateTime<Utc>) -> Duration {
    (Utc::now() - start).to_std().unwrap_or_default()
}
