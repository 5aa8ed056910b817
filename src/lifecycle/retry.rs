//! Start with exponential backoff

use super::Service;
use crate::error::{Result, ServiceError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff settings for [`start_with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryOptions {
    /// Delay after the failed attempt number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Call `service.start` until it succeeds or `max_attempts` are used up.
///
/// Waits `min(initial_delay * 2^attempt, max_delay)` between attempts and
/// returns `Cancelled` as soon as `ctx` is cancelled during a wait.
pub async fn start_with_retry<S>(
    service: &S,
    ctx: &CancellationToken,
    options: RetryOptions,
) -> Result<()>
where
    S: Service + ?Sized,
{
    if options.max_attempts == 0 {
        return Err(ServiceError::invalid_config(
            "max_attempts must be at least 1",
        ));
    }

    let mut attempt = 0;
    loop {
        let err = match service.start(ctx).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        tracing::warn!(
            service = %service.name(),
            attempt = attempt + 1,
            max_attempts = options.max_attempts,
            error = %err,
            "Service start attempt failed"
        );

        if attempt + 1 >= options.max_attempts {
            return Err(ServiceError::RetryExhausted {
                service: service.name().to_string(),
                attempts: attempt + 1,
                source: Box::new(err),
            });
        }

        let delay = options.delay_for(attempt);
        tokio::select! {
            _ = ctx.cancelled() => {
                return Err(ServiceError::Cancelled(format!(
                    "retrying start of {}",
                    service.name()
                )));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
