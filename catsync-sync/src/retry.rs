//! Bounded exponential backoff for catalog calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use catsync_catalog::CatalogError;
use catsync_core::SyncerConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncerConfig) -> Self {
        Self {
            max_attempts: config.write_attempts.max(1),
            initial_delay: config.initial_backoff,
            max_delay: config.max_backoff,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// attempts.
///
/// When `deadline` is set, a retry whose backoff would end past it is not
/// attempted; the last error is returned so the caller can defer to its next
/// pass.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    operation_name: &str,
    mut operation: F,
) -> Result<T, CatalogError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            error!(
                operation = %operation_name,
                attempt,
                error = %err,
                "catalog call failed permanently"
            );
            return Err(err);
        }
        if attempt >= policy.max_attempts {
            error!(
                operation = %operation_name,
                attempt,
                error = %err,
                "catalog call failed after max attempts"
            );
            return Err(err);
        }
        if deadline.is_some_and(|deadline| Instant::now() + delay > deadline) {
            warn!(
                operation = %operation_name,
                attempt,
                error = %err,
                "retry would overrun the pass deadline; deferring"
            );
            return Err(err);
        }

        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "catalog call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}
