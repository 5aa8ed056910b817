//! # Conductor
//!
//! Dependency-ordered lifecycle orchestration for in-process services.
//!
//! Conductor starts a set of named, interdependent components in an order
//! that respects their declared dependencies, drives each of them through a
//! validated state machine, and shuts them down again in reverse order.
//!
//! ## Features
//!
//! - **Dependency Graph**: Cycles are rejected when a service is added
//! - **Validated State Machine**: Lock-free, compare-and-swap transitions
//! - **Composable Services**: Build services from closures with `BaseService`
//! - **Fail-fast Start, Fail-safe Stop**: Under configurable time budgets
//! - **Health Checks, Events and Metrics**: Observe every service while it runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> conductor::Result<()> {
//!     let group = ServiceGroup::builder()
//!         .start_timeout(Duration::from_secs(30))
//!         .build();
//!
//!     group.add(
//!         BaseService::builder("database")
//!             .priority(ServicePriority::HIGH)
//!             .on_start(|_ctx| async move {
//!                 tracing::info!("Connecting");
//!                 Ok(())
//!             })
//!             .build(),
//!     )?;
//!     group.add(BaseService::builder("api").depends_on("database").build())?;
//!
//!     group.start().await?;
//!     ShutdownHandler::new(group.clone()).wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod group;
pub mod lifecycle;
pub mod messaging;
pub mod metrics;
pub mod state;

// Re-export core types
pub use config::{ConfigService, ServiceGroupOptions};
pub use error::{ErrorCode, Result, ServiceError};
pub use group::{GroupState, ServiceGroup, ServiceGroupBuilder};
pub use lifecycle::{BaseService, Service};
pub use state::{ServicePriority, ServiceState};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// ```
/// use conductor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigService, ServiceGroupOptions};
    pub use crate::error::{ErrorCode, Result, ServiceError};
    pub use crate::graph::{DependencyGraph, ServiceNode};
    pub use crate::group::{GroupState, ServiceGroup, ServiceGroupBuilder};
    pub use crate::lifecycle::{
        BaseService, BaseServiceBuilder, ConfigValue, RetryOptions, Service, ShutdownHandler,
        shutdown_signal, start_with_retry,
    };
    pub use crate::messaging::{
        EventFilter, EventListener, EventManager, EventType, FnListener, ListenerId, ServiceEvent,
    };
    pub use crate::metrics::{MetricsCollector, ServiceMetrics};
    pub use crate::state::{ServicePriority, ServiceState, StateMachine};
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
}
