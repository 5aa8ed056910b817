//! Inspection and per-service administration of a running group

use super::ServiceGroup;
use crate::error::{Result, ServiceError};
use crate::lifecycle::{ConfigValue, Service};
use crate::messaging::{EventFilter, EventListener, EventType, ListenerId, ServiceEvent};
use crate::metrics::ServiceMetrics;
use crate::state::ServiceState;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Summary of every service's state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupState {
    pub total_services: usize,
    pub running_services: usize,
    pub failed_services: usize,
    pub service_states: BTreeMap<String, ServiceState>,
}

impl ServiceGroup {
    pub fn group_state(&self) -> GroupState {
        let service_states = self.service_states();
        GroupState {
            total_services: service_states.len(),
            running_services: count(&service_states, ServiceState::Running),
            failed_services: count(&service_states, ServiceState::Error),
            service_states,
        }
    }

    pub fn get_service(&self, name: &str) -> Result<Arc<dyn Service>> {
        self.inner
            .services
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ServiceError::not_found(name))
    }

    /// Registered service names, sorted
    pub fn list_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .services
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn service_states(&self) -> BTreeMap<String, ServiceState> {
        self.inner
            .services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }

    pub fn start_order(&self) -> Result<Vec<String>> {
        self.inner.graph.start_order()
    }

    pub fn stop_order(&self) -> Result<Vec<String>> {
        self.inner.graph.stop_order()
    }

    pub fn service_metrics(&self, name: &str) -> Result<ServiceMetrics> {
        self.inner
            .metrics
            .get(name)
            .ok_or_else(|| ServiceError::not_found(name))
    }

    pub fn all_metrics(&self) -> HashMap<String, ServiceMetrics> {
        self.inner.metrics.all()
    }

    /// Stop then start one service
    ///
    /// Returns the first failure; a failed stop skips the start.
    pub async fn restart_service(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        async {
            self.get_service(name)?;
            tracing::info!(service = %name, "Restarting service");

            self.stop_service(name, ctx)
                .await
                .map_err(|e| ServiceError::shutdown_failed(name, e))?;
            self.start_service(name, ctx)
                .await
                .map_err(|e| ServiceError::startup_failed(name, e))?;

            self.inner.metrics.record_restart(name);
            let state = self.get_service(name)?.state();
            self.inner
                .events
                .publish(ServiceEvent::new(name, EventType::Restart, state));
            Ok(())
        }
        .instrument(self.inner.span.clone())
        .await
    }

    /// Pass a configuration value to one service
    pub async fn update_service(
        &self,
        ctx: &CancellationToken,
        name: &str,
        config: ConfigValue,
    ) -> Result<()> {
        let service = self.get_service(name)?;
        service.update(ctx, config).await.inspect_err(|e| {
            self.inner.span.in_scope(|| {
                tracing::warn!(service = %name, error = %e, "Service rejected update");
            });
        })
    }

    /// Deliver events matching `filter` to `listener`
    ///
    /// Fails with `InvalidState` outside a Tokio runtime.
    pub fn add_event_listener(
        &self,
        filter: impl Into<EventFilter>,
        listener: impl EventListener,
    ) -> Result<ListenerId> {
        self.inner.events.add_listener(filter, listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    /// A raw receiver of every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.events.subscribe()
    }
}

fn count(states: &BTreeMap<String, ServiceState>, wanted: ServiceState) -> usize {
    states.values().filter(|&&state| state == wanted).count()
}
