//! Exponential backoff for store requests
//!
//! Transient store failures (`Store`, `Concurrency`) are retried until the
//! configured elapsed-time budget runs out. Everything else, overclaims
//! included, is returned to the caller on the first attempt.

use crate::config::RetryConfig;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Build the backoff policy
pub fn policy(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_delay_ms))
        .with_max_interval(Duration::from_millis(config.max_delay_ms))
        .with_multiplier(config.multiplier)
        .with_max_elapsed_time(Some(Duration::from_millis(config.max_elapsed_ms)))
        .build()
}

fn classify(err: tabsplit_ledger::Error) -> backoff::Error<tabsplit_ledger::Error> {
    if err.is_transient() {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

/// Run `operation`, retrying transient failures
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = tabsplit_ledger::Result<T>>,
{
    backoff::future::retry_notify(
        policy(config),
        || {
            let attempt = operation();
            async move { attempt.await.map_err(classify) }
        },
        |err: tabsplit_ledger::Error, delay: Duration| {
            warn!(
                operation = operation_name,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying: {}",
                err
            );
        },
    )
    .await
    .map_err(crate::Error::from)
}
