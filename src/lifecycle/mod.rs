//! Service Lifecycle Module
//!
//! This module defines the capability contract every managed service
//! implements, and a default implementation that binds lifecycle hooks to a
//! validated state machine.
//!
//! # Lifecycle Phases
//!
//! ```text
//! Uninitialized
//!    ↓  init hook
//! Initialized
//!    ↓
//! Starting ──(start hook fails)──→ Error
//!    ↓  start hook                   │
//! Running ───────────────────────→ Error
//!    ↓                               │
//! Stopping ──(stop hook fails)───→ Error
//!    ↓  stop hook                    │
//! Stopped ←──────────────────────────┘
//!    ↓
//! Starting (restart)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::lifecycle::{BaseService, RetryOptions, start_with_retry};
//! use tokio_util::sync::CancellationToken;
//!
//! let cache = BaseService::builder("cache")
//!     .depends_on("database")
//!     .on_start(|_ctx| async move {
//!         tracing::info!("Warming cache");
//!         Ok(())
//!     })
//!     .build();
//!
//! start_with_retry(&cache, &CancellationToken::new(), RetryOptions::default()).await?;
//! ```

mod base;
mod retry;
mod shutdown;
mod traits;

pub use base::{BaseService, BaseServiceBuilder, HookFuture};
pub use retry::{RetryOptions, start_with_retry};
pub use shutdown::{ShutdownHandler, shutdown_signal};
pub use traits::{ConfigValue, Service};
