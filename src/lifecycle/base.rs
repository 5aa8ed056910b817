//! Default [`Service`] implementation
//!
//! `BaseService` binds optional caller-supplied hooks (init, start, stop,
//! update, health) to a [`StateMachine`]. Hooks are plain closures returning
//! futures, composed in through [`BaseServiceBuilder`].

use super::{ConfigValue, Service};
use crate::error::{Hook, Result, ServiceError};
use crate::state::{ServicePriority, ServiceState, StateMachine, TransitionCallback};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Boxed future returned by every lifecycle hook
pub type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

type LifecycleHook = Arc<dyn Fn(CancellationToken) -> HookFuture + Send + Sync>;
type UpdateHook = Arc<dyn Fn(CancellationToken, ConfigValue) -> HookFuture + Send + Sync>;

#[derive(Default, Clone)]
struct Hooks {
    init: Option<LifecycleHook>,
    start: Option<LifecycleHook>,
    stop: Option<LifecycleHook>,
    update: Option<UpdateHook>,
    health: Option<LifecycleHook>,
}

/// The default lifecycle implementation
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::BaseService;
/// use conductor::state::ServicePriority;
///
/// let api = BaseService::builder("api")
///     .depends_on("database")
///     .priority(ServicePriority::LOW)
///     .on_start(|ctx| async move {
///         // bind listeners, spawn workers watching `ctx`
///         Ok(())
///     })
///     .on_stop(|_ctx| async move { Ok(()) })
///     .build();
/// ```
pub struct BaseService {
    name: String,
    dependencies: Vec<String>,
    priority: ServicePriority,
    state: StateMachine,
    hooks: Hooks,
    span: Span,
}

impl BaseService {
    /// Start building a service named `name`
    pub fn builder(name: impl Into<String>) -> BaseServiceBuilder {
        BaseServiceBuilder::new(name)
    }

    /// A service with no hooks
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// The underlying state machine, for manual recovery via `reset`
    pub fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    /// The span this service logs under
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Move to `Error` after a hook failure. Uses the legal edge when there
    /// is one and overwrites the state otherwise.
    fn enter_error(&self) {
        if let Err(err) = self.state.transition_to(ServiceState::Error) {
            self.span.in_scope(|| {
                tracing::warn!(error = %err, "Forcing service into Error state");
            });
            self.state.reset(ServiceState::Error);
        }
    }

    async fn run_hook(
        &self,
        hook: &LifecycleHook,
        kind: Hook,
        ctx: &CancellationToken,
    ) -> Result<()> {
        hook(ctx.clone())
            .instrument(self.span.clone())
            .await
            .map_err(|e| {
                self.span.in_scope(|| {
                    tracing::error!(hook = %kind, error = %e, "Lifecycle hook failed");
                });
                ServiceError::hook_failed(&self.name, kind, e)
            })
    }
}

#[async_trait]
impl Service for BaseService {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ServiceState {
        self.state.current()
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn priority(&self) -> ServicePriority {
        self.priority
    }

    async fn init(&self, ctx: &CancellationToken) -> Result<()> {
        self.state.transition_to(ServiceState::Initialized)?;

        if let Some(hook) = &self.hooks.init {
            if let Err(e) = self.run_hook(hook, Hook::Init, ctx).await {
                self.enter_error();
                return Err(e);
            }
        }
        Ok(())
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        match self.state.current() {
            ServiceState::Uninitialized => self.init(ctx).await?,
            // Error -> Initialized is a legal edge; init hooks are not re-run
            ServiceState::Error => self.state.transition_to(ServiceState::Initialized)?,
            _ => {}
        }

        self.state.transition_to(ServiceState::Starting)?;

        if let Some(hook) = &self.hooks.start {
            if let Err(e) = self.run_hook(hook, Hook::Start, ctx).await {
                self.enter_error();
                return Err(e);
            }
        }

        self.state.transition_to(ServiceState::Running)
    }

    async fn stop(&self, ctx: &CancellationToken) -> Result<()> {
        self.state.transition_to(ServiceState::Stopping)?;

        if let Some(hook) = &self.hooks.stop {
            if let Err(e) = self.run_hook(hook, Hook::Stop, ctx).await {
                self.enter_error();
                return Err(e);
            }
        }

        self.state.transition_to(ServiceState::Stopped)
    }

    async fn update(&self, ctx: &CancellationToken, config: ConfigValue) -> Result<()> {
        let Some(hook) = &self.hooks.update else {
            return Ok(());
        };

        hook(ctx.clone(), config)
            .instrument(self.span.clone())
            .await
            .map_err(|e| ServiceError::hook_failed(&self.name, Hook::Update, e))
    }

    async fn health_check(&self, ctx: &CancellationToken) -> Result<()> {
        if self.state.current() != ServiceState::Running {
            return Err(ServiceError::invalid_state("service is not running"));
        }

        match &self.hooks.health {
            Some(hook) => self.run_hook(hook, Hook::HealthCheck, ctx).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseService")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}

/// Builder for [`BaseService`]
pub struct BaseServiceBuilder {
    name: String,
    dependencies: Vec<String>,
    priority: ServicePriority,
    hooks: Hooks,
    span: Option<Span>,
    observer: Option<TransitionCallback>,
    extra_transitions: Vec<(ServiceState, Vec<ServiceState>)>,
    removed_transitions: Vec<(ServiceState, ServiceState)>,
}

impl BaseServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            priority: ServicePriority::default(),
            hooks: Hooks::default(),
            span: None,
            observer: None,
            extra_transitions: Vec::new(),
            removed_transitions: Vec::new(),
        }
    }

    /// Add one dependency
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Add several dependencies
    pub fn dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: impl Into<ServicePriority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Log under `span` instead of the default `service` span
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Observe every successful state transition
    pub fn on_transition<F>(mut self, observer: F) -> Self
    where
        F: Fn(ServiceState, ServiceState) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Extend the transition table
    pub fn transition(mut self, from: ServiceState, to: &[ServiceState]) -> Self {
        self.extra_transitions.push((from, to.to_vec()));
        self
    }

    /// Remove an edge from the transition table
    pub fn without_transition(mut self, from: ServiceState, to: ServiceState) -> Self {
        self.removed_transitions.push((from, to));
        self
    }

    pub fn on_init<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.init = Some(lifecycle_hook(hook));
        self
    }

    pub fn on_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.start = Some(lifecycle_hook(hook));
        self
    }

    pub fn on_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.stop = Some(lifecycle_hook(hook));
        self
    }

    /// Extra health check, run only while the service is `Running`
    pub fn on_health_check<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.health = Some(lifecycle_hook(hook));
        self
    }

    /// Handle raw configuration values. Return
    /// `ServiceError::InvalidConfig` to reject a value.
    pub fn on_update<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(CancellationToken, ConfigValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.update = Some(Arc::new(
            move |ctx: CancellationToken, config: ConfigValue| -> HookFuture {
                Box::pin(hook(ctx, config))
            },
        ));
        self
    }

    /// Handle configuration values deserialized into `T`.
    ///
    /// Values that do not deserialize are rejected with `InvalidConfig`
    /// before the hook runs.
    pub fn on_update_typed<T, F, Fut>(mut self, hook: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let hook = Arc::new(hook);
        self.hooks.update = Some(Arc::new(
            move |ctx: CancellationToken, config: ConfigValue| -> HookFuture {
                let hook = Arc::clone(&hook);
                Box::pin(async move {
                    let typed: T = serde_json::from_value(config).map_err(|e| {
                        ServiceError::invalid_config_with(
                            format!("expected {}", std::any::type_name::<T>()),
                            e,
                        )
                    })?;
                    hook(ctx, typed).await
                })
            },
        ));
        self
    }

    pub fn build(self) -> BaseService {
        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("service", name = %self.name));

        let log_span = span.clone();
        let observer = self.observer;
        let callback: TransitionCallback = Arc::new(move |from, to| {
            log_span.in_scope(|| tracing::debug!(%from, %to, "State transition"));
            if let Some(observer) = &observer {
                observer(from, to);
            }
        });

        let mut state = StateMachine::with_callback(ServiceState::Uninitialized, callback);
        for (from, to) in &self.extra_transitions {
            state.add_transition(*from, to);
        }
        for (from, to) in self.removed_transitions {
            state.remove_transition(from, to);
        }

        BaseService {
            name: self.name,
            dependencies: self.dependencies,
            priority: self.priority,
            state,
            hooks: self.hooks,
            span,
        }
    }
}

fn lifecycle_hook<F, Fut>(hook: F) -> LifecycleHook
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx: CancellationToken| -> HookFuture { Box::pin(hook(ctx)) })
}
