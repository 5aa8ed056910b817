//! Service lifecycle events
//!
//! Events are published on a bounded broadcast channel. Each registered
//! listener gets its own dispatch task, so a slow listener never blocks the
//! publisher or other listeners.

use crate::error::{Result, ServiceError};
use crate::state::ServiceState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Kind of lifecycle event
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
pub enum EventType {
    Init,
    Start,
    Stop,
    Restart,
    Error,
    HealthCheck,
    StateChange,
}

/// Which events a listener receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Only(EventType),
    /// Every event type
    All,
}

impl EventFilter {
    pub fn matches(&self, event_type: EventType) -> bool {
        match self {
            Self::Only(expected) => *expected == event_type,
            Self::All => true,
        }
    }
}

impl From<EventType> for EventFilter {
    fn from(event_type: EventType) -> Self {
        Self::Only(event_type)
    }
}

/// A lifecycle event for one service
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub service_name: String,
    pub event_type: EventType,
    pub state: ServiceState,
    pub timestamp: DateTime<Utc>,
    pub error: Option<ServiceError>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ServiceEvent {
    pub fn new(
        service_name: impl Into<String>,
        event_type: EventType,
        state: ServiceState,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            event_type,
            state,
            timestamp: Utc::now(),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_error(mut self, error: ServiceError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Receives events from an [`EventManager`]
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    async fn on_service_event(&self, event: &ServiceEvent);
}

/// Adapts a plain closure into an [`EventListener`]
pub struct FnListener<F>(pub F);

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&ServiceEvent) + Send + Sync + 'static,
{
    async fn on_service_event(&self, event: &ServiceEvent) {
        (self.0)(event)
    }
}

/// Handle returned by [`EventManager::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ListenerId(Uuid);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Bounded event dispatcher
pub struct EventManager {
    sender: broadcast::Sender<ServiceEvent>,
    listeners: DashMap<ListenerId, JoinHandle<()>>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventManager {
    /// Create a dispatcher buffering at most `capacity` events per listener
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: DashMap::new(),
        }
    }

    /// Register a listener
    ///
    /// Each listener runs on its own task, so this fails with `InvalidState`
    /// when no Tokio runtime is running.
    pub fn add_listener(
        &self,
        filter: impl Into<EventFilter>,
        listener: impl EventListener,
    ) -> Result<ListenerId> {
        self.add_shared_listener(filter, Arc::new(listener))
    }

    pub fn add_shared_listener(
        &self,
        filter: impl Into<EventFilter>,
        listener: Arc<dyn EventListener>,
    ) -> Result<ListenerId> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ServiceError::invalid_state("event listeners need a running Tokio runtime")
        })?;
        let id = ListenerId(Uuid::new_v4());
        let filter = filter.into();
        let mut receiver = self.sender.subscribe();

        let handle = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if filter.matches(event.event_type) {
                            listener.on_service_event(&event).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            listener = %id,
                            skipped,
                            "Event listener lagged, events dropped"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        self.listeners.insert(id, handle);
        tracing::debug!(listener = %id, ?filter, "Event listener added");
        Ok(id)
    }

    /// Stop delivering events to a listener. Returns false if the id is unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        match self.listeners.remove(&id) {
            Some((_, handle)) => {
                handle.abort();
                tracing::debug!(listener = %id, "Event listener removed");
                true
            }
            None => false,
        }
    }

    /// A raw receiver of every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event without waiting for listeners
    pub fn publish(&self, event: ServiceEvent) {
        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for EventManager {
    fn drop(&mut self) {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
    }
}
