//! Graceful Shutdown Handler
//!
//! Waits for OS signals and shuts a service group down gracefully.

use crate::error::Result;
use crate::group::ServiceGroup;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Handles graceful shutdown of a [`ServiceGroup`]
///
/// `ShutdownHandler` listens for OS signals (SIGTERM, SIGINT) and then runs
/// [`ServiceGroup::graceful_stop`].
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::ShutdownHandler;
///
/// group.start().await?;
///
/// let handler = ShutdownHandler::new(group.clone());
/// tokio::spawn(async move {
///     handler.wait_for_shutdown().await;
/// });
/// ```
pub struct ShutdownHandler {
    group: ServiceGroup,
}

impl ShutdownHandler {
    /// Create a new ShutdownHandler
    pub fn new(group: ServiceGroup) -> Self {
        Self { group }
    }

    /// Wait for a shutdown signal and perform graceful shutdown
    ///
    /// This method blocks until either SIGTERM or SIGINT is received.
    pub async fn wait_for_shutdown(&self) {
        shutdown_signal().await;
        if let Err(e) = self.shutdown().await {
            tracing::error!(error = %e, "Error during graceful shutdown");
        }
    }

    /// Shut the group down now, without waiting for a signal
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Starting graceful shutdown...");
        self.group.graceful_stop(&CancellationToken::new()).await?;
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// A signal whose handler cannot be installed is logged and never fires.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         println!("Shutdown signal received");
///     }
///     _ = group.wait_for_start(&ctx) => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
