//! Fluent construction of a [`ServiceGroup`]

use super::ServiceGroup;
use crate::config::ServiceGroupOptions;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Builder for [`ServiceGroup`]
///
/// # Example
///
/// ```rust,ignore
/// use conductor::group::ServiceGroup;
/// use conductor::config::ServiceGroupOptions;
///
/// let group = ServiceGroup::builder()
///     .options(ServiceGroupOptions::from_env()?)
///     .stop_timeout(Duration::from_secs(15))
///     .parent(shutdown_token.clone())
///     .span(tracing::info_span!("workers"))
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ServiceGroupBuilder {
    options: ServiceGroupOptions,
    parent: Option<CancellationToken>,
    span: Option<Span>,
}

impl ServiceGroupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once
    pub fn options(mut self, options: ServiceGroupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.options.start_timeout = timeout;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.options.stop_timeout = timeout;
        self
    }

    /// Set the health check period. `Duration::ZERO` disables health checks.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.options.health_check_interval = interval;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity;
        self
    }

    /// Derive the group's root token from `parent`, so cancelling `parent`
    /// cancels every service context of the group
    pub fn parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Log under `span` instead of the default `service_group` span
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> ServiceGroup {
        let root = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("service_group"));

        ServiceGroup::from_parts(self.options, root, span)
    }
}
