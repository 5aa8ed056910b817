//! Service capability contract
//!
//! Every component managed by a [`ServiceGroup`](crate::group::ServiceGroup)
//! implements [`Service`]. Most services are built from
//! [`BaseService`](super::BaseService) instead of implementing the trait by
//! hand.

use crate::error::Result;
use crate::state::{ServicePriority, ServiceState};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Configuration payload accepted by [`Service::update`].
///
/// Services validate its shape themselves and reject mismatches with
/// `InvalidConfig`.
pub type ConfigValue = serde_json::Value;

/// A named unit with declared dependencies, a priority, and a lifecycle
///
/// Every operation receives a cancellation token. Implementations doing
/// long-running work should observe it; the orchestrator cancels it when a
/// time budget expires or the group shuts down.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::{BaseService, Service};
///
/// let db = BaseService::builder("database")
///     .priority(ServicePriority::HIGH)
///     .on_start(|_ctx| async move {
///         tracing::info!("Opening connection pool");
///         Ok(())
///     })
///     .build();
///
/// group.add(db)?;
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Unique name within a group
    fn name(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> ServiceState;

    /// Names of services that must be running before this one starts
    fn dependencies(&self) -> &[String];

    /// Start priority within a dependency level
    fn priority(&self) -> ServicePriority;

    /// Prepare the service. Called once before the first start.
    async fn init(&self, ctx: &CancellationToken) -> Result<()>;

    /// Bring the service to `Running`
    async fn start(&self, ctx: &CancellationToken) -> Result<()>;

    /// Bring the service to `Stopped`
    ///
    /// Services are stopped in **reverse order** of their start.
    async fn stop(&self, ctx: &CancellationToken) -> Result<()>;

    /// Apply a configuration change
    async fn update(&self, ctx: &CancellationToken, config: ConfigValue) -> Result<()>;

    /// Report whether the service is healthy
    async fn health_check(&self, ctx: &CancellationToken) -> Result<()>;
}
