//! Service group orchestration
//!
//! A [`ServiceGroup`] owns a set of services, starts them in dependency
//! order, polls their health, and stops them in reverse order.
//!
//! Startup is fail-fast: the first failing service aborts the remaining
//! starts. Shutdown is fail-safe: every service is attempted even when some
//! of them fail.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::prelude::*;
//!
//! let group = ServiceGroup::builder()
//!     .start_timeout(Duration::from_secs(10))
//!     .build();
//!
//! group.add(BaseService::builder("database").build())?;
//! group.add(BaseService::builder("api").depends_on("database").build())?;
//!
//! group.start().await?;
//! ShutdownHandler::new(group.clone()).wait_for_shutdown().await;
//! ```

mod admin;
mod builder;

pub use admin::GroupState;
pub use builder::ServiceGroupBuilder;

use crate::config::ServiceGroupOptions;
use crate::error::{Result, ServiceError};
use crate::graph::{DependencyGraph, ServiceNode};
use crate::lifecycle::Service;
use crate::messaging::{EventManager, EventType, ServiceEvent};
use crate::metrics::MetricsCollector;
use crate::state::ServiceState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

type StartupResult = Option<Result<()>>;

struct GroupInner {
    services: DashMap<String, Arc<dyn Service>>,
    graph: DependencyGraph,
    /// Cancelled once by `stop`/`graceful_stop`. Ends the health check.
    root: CancellationToken,
    options: ServiceGroupOptions,
    is_starting: AtomicBool,
    startup: watch::Sender<StartupResult>,
    metrics: MetricsCollector,
    events: EventManager,
    tasks: TaskTracker,
    span: Span,
}

impl Drop for GroupInner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Orchestrates the lifecycle of a set of interdependent services
///
/// Cloning is cheap; clones share the same services and state.
#[derive(Clone)]
pub struct ServiceGroup {
    inner: Arc<GroupInner>,
}

impl Default for ServiceGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceGroup {
    /// A group with default options
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_options(options: ServiceGroupOptions) -> Self {
        Self::builder().options(options).build()
    }

    pub fn builder() -> ServiceGroupBuilder {
        ServiceGroupBuilder::new()
    }

    fn from_parts(options: ServiceGroupOptions, root: CancellationToken, span: Span) -> Self {
        let (startup, _) = watch::channel(None);
        Self {
            inner: Arc::new(GroupInner {
                services: DashMap::new(),
                graph: DependencyGraph::new(),
                root,
                events: EventManager::new(options.event_capacity),
                options,
                is_starting: AtomicBool::new(false),
                startup,
                metrics: MetricsCollector::new(),
                tasks: TaskTracker::new(),
                span,
            }),
        }
    }

    pub fn options(&self) -> &ServiceGroupOptions {
        &self.inner.options
    }

    /// Register a service
    ///
    /// Fails with `ServiceAlreadyExists` for a taken name and with
    /// `CyclicDependency` if the service would close a dependency cycle.
    /// The group is unchanged on failure.
    pub fn add<S: Service>(&self, service: S) -> Result<()> {
        self.add_arc(Arc::new(service))
    }

    /// Register a shared service
    pub fn add_arc(&self, service: Arc<dyn Service>) -> Result<()> {
        let name = service.name().to_string();
        match self.inner.services.entry(name.clone()) {
            Entry::Occupied(_) => return Err(ServiceError::already_exists(&name)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&service));
            }
        }

        let node = ServiceNode::new(
            &name,
            service.priority(),
            service.dependencies().iter().cloned(),
        );
        if let Err(e) = self.inner.graph.add_node(node) {
            self.inner.services.remove(&name);
            return Err(e);
        }

        self.inner.metrics.register(&name);
        self.inner.span.in_scope(|| {
            tracing::info!(
                service = %name,
                priority = %service.priority(),
                dependencies = ?service.dependencies(),
                "Added service to group"
            );
        });
        Ok(())
    }

    /// Start every service in dependency order
    ///
    /// Only the first call proceeds; any later or concurrent call fails with
    /// `InvalidState`. The first failing service aborts startup with
    /// `StartupFailed`; services already started are left running. The whole
    /// call is bounded by `start_timeout`.
    pub async fn start(&self) -> Result<()> {
        if self
            .inner
            .is_starting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServiceError::invalid_state("services are already starting"));
        }

        let result = self.run_startup().instrument(self.inner.span.clone()).await;
        self.inner.startup.send_replace(Some(result.clone()));

        if result.is_ok() && !self.inner.options.health_check_interval.is_zero() {
            self.spawn_health_check();
        }
        result
    }

    async fn run_startup(&self) -> Result<()> {
        let order = self.inner.graph.start_order()?;
        let budget = self.inner.options.start_timeout;
        let ctx = self.inner.root.child_token();

        tracing::info!(services = order.len(), "Starting services");
        match tokio::time::timeout(budget, self.start_in_order(&order, &ctx)).await {
            Ok(Ok(())) => {
                tracing::info!("All services started");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Service group failed to start");
                Err(e)
            }
            Err(_) => {
                ctx.cancel();
                tracing::error!(?budget, "Service group start timed out");
                Err(ServiceError::StartupTimeout {
                    message: format!("start did not finish within {budget:?}"),
                })
            }
        }
    }

    async fn start_in_order(&self, order: &[String], ctx: &CancellationToken) -> Result<()> {
        for name in order {
            self.start_service(name, ctx)
                .await
                .map_err(|e| ServiceError::startup_failed(name, e))?;
        }
        Ok(())
    }

    /// Start one service and report the outcome through metrics and events
    async fn start_service(&self, name: &str, ctx: &CancellationToken) -> Result<()> {
        let service = self.get_service(name)?;
        let before = service.state();

        tracing::debug!(service = %name, "Starting service");
        let result = service.start(ctx).await;

        match &result {
            Ok(()) => {
                self.inner.metrics.record_start(name);
                if before == ServiceState::Uninitialized {
                    self.publish(ServiceEvent::new(name, EventType::Init, service.state()));
                }
                tracing::info!(service = %name, "Service started");
            }
            Err(e) => {
                self.inner.metrics.record_error(name, e);
                tracing::error!(service = %name, error = %e, "Service failed to start");
            }
        }
        self.publish_outcome(service.as_ref(), EventType::Start, before, result.as_ref().err());
        result
    }

    /// Stop one service and report the outcome through metrics and events
    async fn stop_service(&self, name: &str, ctx: &CancellationToken) -> Result<()> {
        let service = self.get_service(name)?;
        let before = service.state();

        tracing::debug!(service = %name, "Stopping service");
        let result = service.stop(ctx).await;

        match &result {
            Ok(()) => {
                self.inner.metrics.record_stop(name);
                tracing::info!(service = %name, "Service stopped");
            }
            Err(e) => {
                self.inner.metrics.record_error(name, e);
                tracing::error!(service = %name, error = %e, "Error stopping service");
            }
        }
        self.publish_outcome(service.as_ref(), EventType::Stop, before, result.as_ref().err());
        result
    }

    /// Stop every started service, one at a time, in reverse start order
    ///
    /// Cancels the group's root token first. A failing service does not
    /// prevent the rest from being stopped; the last failure is returned.
    /// Fails with `ShutdownTimeout` if `stop_timeout` expires.
    pub async fn stop(&self) -> Result<()> {
        self.stop_sequential()
            .instrument(self.inner.span.clone())
            .await
    }

    async fn stop_sequential(&self) -> Result<()> {
        self.inner.root.cancel();
        self.inner.tasks.close();

        let order = self.stop_order_for_shutdown()?;
        let budget = self.inner.options.stop_timeout;
        let ctx = CancellationToken::new();

        tracing::info!(services = order.len(), "Stopping services");
        let run = async {
            self.inner.tasks.wait().await;
            let mut last_err = None;
            for name in &order {
                if !self.needs_stop(name) {
                    continue;
                }
                if let Err(e) = self.stop_service(name, &ctx).await {
                    last_err = Some(ServiceError::shutdown_failed(name, e));
                }
            }
            last_err.map_or(Ok(()), Err)
        };

        match tokio::time::timeout(budget, run).await {
            Ok(result) => result,
            Err(_) => {
                ctx.cancel();
                tracing::error!(?budget, "Service group stop timed out");
                Err(ServiceError::ShutdownTimeout {
                    message: format!("stop did not finish within {budget:?}"),
                })
            }
        }
    }

    /// Stop every started service concurrently
    ///
    /// Stop tasks are spawned in reverse start order. Individual failures are
    /// logged, recorded, and published as `Stop` events carrying the error,
    /// but do not fail the call. Fails with `ShutdownTimeout` if `ctx` is
    /// cancelled or `stop_timeout` expires first.
    pub async fn graceful_stop(&self, ctx: &CancellationToken) -> Result<()> {
        self.stop_concurrent(ctx)
            .instrument(self.inner.span.clone())
            .await
    }

    async fn stop_concurrent(&self, ctx: &CancellationToken) -> Result<()> {
        self.inner.root.cancel();
        self.inner.tasks.close();

        let order = self.stop_order_for_shutdown()?;
        let budget = self.inner.options.stop_timeout;
        let stop_ctx = ctx.child_token();
        let stops = TaskTracker::new();

        tracing::info!(services = order.len(), "Gracefully stopping services");
        let run = async {
            self.inner.tasks.wait().await;
            for name in order {
                if !self.needs_stop(&name) {
                    continue;
                }
                let group = self.clone();
                let stop_ctx = stop_ctx.clone();
                stops.spawn(
                    async move {
                        // Already recorded and published by stop_service
                        let _ = group.stop_service(&name, &stop_ctx).await;
                    }
                    .in_current_span(),
                );
            }
            stops.close();
            stops.wait().await;
        };

        tokio::select! {
            _ = run => {
                tracing::info!("Graceful stop complete");
                Ok(())
            }
            _ = ctx.cancelled() => {
                stop_ctx.cancel();
                tracing::error!("Graceful stop cancelled");
                Err(ServiceError::ShutdownTimeout {
                    message: "context cancelled before services stopped".to_string(),
                })
            }
            _ = tokio::time::sleep(budget) => {
                stop_ctx.cancel();
                tracing::error!(?budget, "Graceful stop timed out");
                Err(ServiceError::ShutdownTimeout {
                    message: format!("stop did not finish within {budget:?}"),
                })
            }
        }
    }

    fn stop_order_for_shutdown(&self) -> Result<Vec<String>> {
        self.inner
            .graph
            .stop_order()
            .map_err(|e| ServiceError::StopOrder {
                source: Box::new(e),
            })
    }

    /// Services that never started, or already stopped, are skipped on shutdown
    fn needs_stop(&self, name: &str) -> bool {
        let Some(service) = self.inner.services.get(name).map(|s| Arc::clone(s.value())) else {
            return false;
        };
        let state = service.state();
        let skip = matches!(
            state,
            ServiceState::Uninitialized | ServiceState::Initialized | ServiceState::Stopped
        );
        if skip {
            tracing::debug!(service = %name, %state, "Skipping service that is not started");
        }
        !skip
    }

    /// Wait until `start` has finished and return its result
    ///
    /// Fails with `StartupTimeout` if `ctx` is cancelled first.
    pub async fn wait_for_start(&self, ctx: &CancellationToken) -> Result<()> {
        let mut startup = self.inner.startup.subscribe();

        tokio::select! {
            _ = ctx.cancelled() => Err(ServiceError::StartupTimeout {
                message: "context cancelled while waiting for services to start".to_string(),
            }),
            recorded = startup.wait_for(Option::is_some) => match recorded {
                Ok(result) => (*result).clone().unwrap_or(Ok(())),
                Err(_) => Err(ServiceError::Cancelled(
                    "service group dropped before start finished".to_string(),
                )),
            },
        }
    }

    /// Whether `start` has completed successfully
    pub fn is_started(&self) -> bool {
        matches!(*self.inner.startup.borrow(), Some(Ok(())))
    }

    fn spawn_health_check(&self) {
        let interval = self.inner.options.health_check_interval;
        let Some(first_tick) = tokio::time::Instant::now().checked_add(interval) else {
            self.inner.span.in_scope(|| {
                tracing::warn!(
                    ?interval,
                    "Health check interval out of range, polling disabled"
                );
            });
            return;
        };
        let root = self.inner.root.clone();
        let weak: Weak<GroupInner> = Arc::downgrade(&self.inner);

        self.inner.tasks.spawn(
            async move {
                let mut ticker = tokio::time::interval_at(first_tick, interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = root.cancelled() => break,
                        _ = ticker.tick() => {
                            let Some(inner) = weak.upgrade() else { break };
                            let group = ServiceGroup { inner };
                            // A hook ignoring its token must not hold up shutdown
                            tokio::select! {
                                _ = root.cancelled() => break,
                                _ = group.check_health(&root) => {}
                            }
                        }
                    }
                }
                tracing::debug!("Health check loop stopped");
            }
            .instrument(self.inner.span.clone()),
        );
    }

    async fn check_health(&self, ctx: &CancellationToken) {
        let mut services: Vec<_> = self
            .inner
            .services
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        services.sort_by(|a, b| a.name().cmp(b.name()));

        for service in services {
            if ctx.is_cancelled() {
                return;
            }
            let name = service.name();
            let result = service.health_check(ctx).await;
            self.inner
                .metrics
                .record_health_check(name, result.as_ref().map(|_| ()));

            if let Err(e) = result {
                tracing::warn!(service = %name, error = %e, "Service health check failed");
                self.publish(
                    ServiceEvent::new(name, EventType::HealthCheck, service.state()).with_error(e),
                );
            }
        }
    }

    fn publish(&self, event: ServiceEvent) {
        self.inner.events.publish(event);
    }

    /// Publish the operation event, plus `StateChange` and `Error` events
    /// when the service's state moved
    fn publish_outcome(
        &self,
        service: &dyn Service,
        kind: EventType,
        before: ServiceState,
        error: Option<&ServiceError>,
    ) {
        let name = service.name();
        let after = service.state();

        let mut event = ServiceEvent::new(name, kind, after);
        if let Some(e) = error {
            event = event.with_error(e.clone());
        }
        self.publish(event);

        if after != before {
            self.publish(
                ServiceEvent::new(name, EventType::StateChange, after)
                    .with_metadata("from", before.to_string()),
            );
            if after == ServiceState::Error {
                let mut event = ServiceEvent::new(name, EventType::Error, after);
                if let Some(e) = error {
                    event = event.with_error(e.clone());
                }
                self.publish(event);
            }
        }
    }
}

impl std::fmt::Debug for ServiceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceGroup")
            .field("services", &self.inner.services.len())
            .field("options", &self.inner.options)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::lifecycle::BaseService;
    use crate::messaging::EventFilter;
    use crate::state::ServicePriority;
    use std::sync::Mutex;
    use std::time::Duration;

    type CallLog = Arc<Mutex<Vec<String>>>;

    fn quiet_group() -> ServiceGroup {
        ServiceGroup::builder()
            .health_check_interval(Duration::ZERO)
            .build()
    }

    fn tracked(name: &str, log: &CallLog) -> crate::lifecycle::BaseServiceBuilder {
        let (start_log, stop_log) = (Arc::clone(log), Arc::clone(log));
        let (start_name, stop_name) = (name.to_string(), name.to_string());
        BaseService::builder(name)
            .on_start(move |_| {
                let log = Arc::clone(&start_log);
                let entry = format!("start:{start_name}");
                async move {
                    log.lock().unwrap().push(entry);
                    Ok(())
                }
            })
            .on_stop(move |_| {
                let log = Arc::clone(&stop_log);
                let entry = format!("stop:{stop_name}");
                async move {
                    log.lock().unwrap().push(entry);
                    Ok(())
                }
            })
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_and_cycles() {
        let group = quiet_group();
        group.add(BaseService::builder("a").depends_on("b").build()).unwrap();

        let err = group.add(BaseService::new("a")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceAlreadyExists);

        let err = group
            .add(BaseService::builder("b").depends_on("a").build())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DependencyFailed);

        // The rejected service was rolled back from the registry too
        assert_eq!(group.list_services(), vec!["a".to_string()]);
        assert!(group.get_service("b").is_err());
        assert!(group.service_metrics("b").is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop_follow_dependencies() {
        let log = CallLog::default();
        let group = quiet_group();
        group.add(tracked("api", &log).depends_on("cache").build()).unwrap();
        group.add(tracked("cache", &log).depends_on("db").build()).unwrap();
        group.add(tracked("db", &log).build()).unwrap();

        group.start().await.unwrap();
        group.stop().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start:db", "start:cache", "start:api", "stop:api", "stop:cache", "stop:db",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let group = quiet_group();
        group.add(BaseService::new("db")).unwrap();

        let other = group.clone();
        let (first, second) = tokio::join!(group.start(), other.start());
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err().code(), ErrorCode::InvalidState);

        let err = group.start().await.unwrap_err();
        assert!(err.to_string().contains("already starting"));
    }

    #[tokio::test]
    async fn test_start_timeout() {
        let group = ServiceGroup::builder()
            .start_timeout(Duration::from_millis(50))
            .health_check_interval(Duration::ZERO)
            .build();
        group
            .add(
                BaseService::builder("slow")
                    .on_start(|ctx| async move {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        drop(ctx);
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();

        let err = group.start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StartupTimeout);
        assert!(!group.is_started());
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_start() {
        let group = quiet_group();
        group
            .add(BaseService::builder("api").depends_on("ghost").build())
            .unwrap();

        let err = group.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingDependency { .. }));
        let recorded = group
            .wait_for_start(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(recorded.code(), ErrorCode::DependencyFailed);
    }

    #[tokio::test]
    async fn test_wait_for_start() {
        let group = quiet_group();
        group.add(BaseService::new("db")).unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let err = group.wait_for_start(&cancelled).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StartupTimeout);

        let waiter = {
            let group = group.clone();
            tokio::spawn(async move { group.wait_for_start(&CancellationToken::new()).await })
        };
        tokio::task::yield_now().await;
        group.start().await.unwrap();

        waiter.await.unwrap().unwrap();
        assert!(group.is_started());
    }

    #[tokio::test]
    async fn test_stop_timeout() {
        let group = ServiceGroup::builder()
            .stop_timeout(Duration::from_millis(50))
            .health_check_interval(Duration::ZERO)
            .build();
        group
            .add(
                BaseService::builder("stuck")
                    .on_stop(|_| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        group.start().await.unwrap();

        let err = group.stop().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ShutdownTimeout);
    }

    #[tokio::test]
    async fn test_graceful_stop_honours_context() {
        let group = quiet_group();
        group
            .add(
                BaseService::builder("stuck")
                    .on_stop(|_| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        group.start().await.unwrap();

        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = group.graceful_stop(&ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ShutdownTimeout);
    }

    #[tokio::test]
    async fn test_graceful_stop_deadline() {
        let group = ServiceGroup::builder()
            .stop_timeout(Duration::from_millis(50))
            .health_check_interval(Duration::ZERO)
            .build();
        group
            .add(
                BaseService::builder("stuck")
                    .on_stop(|_| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        group.start().await.unwrap();

        // The caller's context is never cancelled; only stop_timeout can end the wait
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            group.graceful_stop(&CancellationToken::new()),
        )
        .await
        .expect("stop_timeout bounds graceful_stop")
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ShutdownTimeout);
    }

    fn hanging_health_group() -> ServiceGroup {
        let group = ServiceGroup::builder()
            .health_check_interval(Duration::from_millis(10))
            .stop_timeout(Duration::from_millis(300))
            .build();
        group
            .add(
                BaseService::builder("api")
                    .on_health_check(|_| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        group
    }

    #[tokio::test]
    async fn test_stop_not_blocked_by_hanging_health_check() {
        let group = hanging_health_group();
        group.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        group.stop().await.unwrap();
        assert_eq!(group.service_states()["api"], ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_graceful_stop_not_blocked_by_hanging_health_check() {
        let group = hanging_health_group();
        group.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        group.graceful_stop(&CancellationToken::new()).await.unwrap();
        assert_eq!(group.service_states()["api"], ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_out_of_range_health_interval_disables_polling() {
        let config = crate::config::ConfigService::new();
        config.set(
            crate::config::HEALTH_CHECK_INTERVAL_KEY,
            "18446744073709551615",
        );
        let options = ServiceGroupOptions::from_config(&config).unwrap();
        let group = ServiceGroup::with_options(options);
        group.add(BaseService::new("api")).unwrap();

        group.start().await.unwrap();
        assert!(group.inner.tasks.is_empty());

        group.stop().await.unwrap();
        assert_eq!(group.service_states()["api"], ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_skips_services_never_started() {
        let group = quiet_group();
        group.add(BaseService::new("idle")).unwrap();

        group.stop().await.unwrap();
        assert_eq!(
            group.service_states().get("idle"),
            Some(&ServiceState::Uninitialized)
        );
    }

    #[tokio::test]
    async fn test_health_check_records_metrics_and_failures() {
        let group = ServiceGroup::builder()
            .health_check_interval(Duration::from_millis(20))
            .build();
        group.add(BaseService::new("ok")).unwrap();
        group
            .add(
                BaseService::builder("sick")
                    .priority(ServicePriority::LOW)
                    .on_health_check(|_| async { Err(anyhow::anyhow!("disk full")) })
                    .build(),
            )
            .unwrap();
        let mut events = group.subscribe();

        group.start().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = events.recv().await.unwrap();
                if event.event_type == EventType::HealthCheck {
                    return event;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.service_name, "sick");
        assert!(event.error.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        group.stop().await.unwrap();

        let ok = group.service_metrics("ok").unwrap();
        let sick = group.service_metrics("sick").unwrap();
        assert!(ok.health_check_count >= 1);
        assert_eq!(ok.health_check_errors, 0);
        assert!(sick.health_check_errors >= 1);

        // No more checks once the root token is cancelled
        let frozen = group.service_metrics("ok").unwrap().health_check_count;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(group.service_metrics("ok").unwrap().health_check_count, frozen);
    }

    #[tokio::test]
    async fn test_listener_receives_start_events() {
        let group = quiet_group();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        group
            .add_event_listener(
                EventFilter::Only(EventType::Start),
                crate::messaging::FnListener(move |event: &ServiceEvent| {
                    sink.lock().unwrap().push(event.service_name.clone());
                }),
            )
            .unwrap();
        group.add(BaseService::new("a")).unwrap();
        group.add(BaseService::builder("b").depends_on("a").build()).unwrap();

        group.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
