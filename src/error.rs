//! Error types shared by every orchestration component.

use crate::state::ServiceState;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// A cloneable, type-erased cause attached to a [`ServiceError`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized Result type for orchestration operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Stable error codes, one per failure category.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[repr(u16)]
pub enum ErrorCode {
    ServiceNotFound = 1,
    ServiceAlreadyExists = 2,
    InvalidState = 3,
    StartupTimeout = 4,
    StartupFailed = 5,
    ShutdownTimeout = 6,
    ShutdownFailed = 7,
    DependencyFailed = 8,
    InvalidConfig = 9,
    ConcurrentStateChange = 10,
    HookFailed = 11,
    Cancelled = 12,
}

impl ErrorCode {
    /// Numeric value of the code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// The lifecycle hook that produced a [`ServiceError::HookFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Hook {
    Init,
    Start,
    Stop,
    Update,
    HealthCheck,
}

/// Errors that can occur while managing services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// No service is registered under this name
    #[error("service {name} not found")]
    ServiceNotFound { name: String },

    /// A service with this name is already registered
    #[error("service {name} already exists")]
    ServiceAlreadyExists { name: String },

    /// The operation is not valid in the current state
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// The transition table has no edge between the two states
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: ServiceState, to: ServiceState },

    /// Another transition won the compare-and-swap race
    #[error("state was changed concurrently: expected {expected}, found {actual}")]
    ConcurrentStateChange {
        expected: ServiceState,
        actual: ServiceState,
    },

    /// Startup did not finish within its budget
    #[error("timeout waiting for services to start: {message}")]
    StartupTimeout { message: String },

    /// A service failed during group startup
    #[error("failed to start service {service}")]
    StartupFailed {
        service: String,
        #[source]
        source: Box<ServiceError>,
    },

    /// Shutdown did not finish within its budget
    #[error("timeout waiting for services to stop: {message}")]
    ShutdownTimeout { message: String },

    /// A service failed during group shutdown
    #[error("failed to stop service {service}")]
    ShutdownFailed {
        service: String,
        #[source]
        source: Box<ServiceError>,
    },

    /// The stop order could not be computed
    #[error("failed to determine service stop order")]
    StopOrder {
        #[source]
        source: Box<ServiceError>,
    },

    /// Adding the node would close a dependency cycle
    #[error("cyclic dependency detected involving {service}")]
    CyclicDependency { service: String },

    /// A declared dependency has no node in the graph
    #[error("service {service} depends on unknown service {dependency}")]
    MissingDependency { service: String, dependency: String },

    /// A configuration value was rejected
    #[error("invalid config: {message}")]
    InvalidConfig {
        message: String,
        #[source]
        source: Option<SharedError>,
    },

    /// A caller-supplied lifecycle hook returned an error
    #[error("{hook} hook failed for service {service}")]
    HookFailed {
        service: String,
        hook: Hook,
        #[source]
        source: SharedError,
    },

    /// `start_with_retry` ran out of attempts
    #[error("service {service} start failed after {attempts} attempts")]
    RetryExhausted {
        service: String,
        attempts: u32,
        #[source]
        source: Box<ServiceError>,
    },

    /// The governing context was cancelled
    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

impl ServiceError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ServiceNotFound { .. } => ErrorCode::ServiceNotFound,
            Self::ServiceAlreadyExists { .. } => ErrorCode::ServiceAlreadyExists,
            Self::InvalidState { .. } | Self::InvalidStateTransition { .. } => {
                ErrorCode::InvalidState
            }
            Self::ConcurrentStateChange { .. } => ErrorCode::ConcurrentStateChange,
            Self::StartupTimeout { .. } => ErrorCode::StartupTimeout,
            Self::StartupFailed { .. } | Self::RetryExhausted { .. } => ErrorCode::StartupFailed,
            Self::ShutdownTimeout { .. } => ErrorCode::ShutdownTimeout,
            Self::ShutdownFailed { .. } | Self::StopOrder { .. } => ErrorCode::ShutdownFailed,
            Self::CyclicDependency { .. } | Self::MissingDependency { .. } => {
                ErrorCode::DependencyFailed
            }
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::HookFailed { .. } => ErrorCode::HookFailed,
            Self::Cancelled(_) => ErrorCode::Cancelled,
        }
    }

    /// Create a service-not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::ServiceNotFound { name: name.into() }
    }

    /// Create a duplicate-service error
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::ServiceAlreadyExists { name: name.into() }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an invalid-config error without an underlying cause
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid-config error wrapping its cause
    pub fn invalid_config_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::InvalidConfig {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Wrap a hook error. A hook that already returned a `ServiceError`
    /// keeps it as is.
    pub fn hook_failed(service: impl Into<String>, hook: Hook, err: anyhow::Error) -> Self {
        match err.downcast::<ServiceError>() {
            Ok(service_err) => service_err,
            Err(other) => {
                let boxed: Box<dyn std::error::Error + Send + Sync> = other.into();
                Self::HookFailed {
                    service: service.into(),
                    hook,
                    source: Arc::from(boxed),
                }
            }
        }
    }

    pub(crate) fn startup_failed(service: impl Into<String>, source: ServiceError) -> Self {
        Self::StartupFailed {
            service: service.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn shutdown_failed(service: impl Into<String>, source: ServiceError) -> Self {
        Self::ShutdownFailed {
            service: service.into(),
            source: Box::new(source),
        }
    }
}
