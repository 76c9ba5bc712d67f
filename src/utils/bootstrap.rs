//! Bootstrap utilities for the periscope binary.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the PERISCOPE_LOG environment variable.
///
/// Defaults to "info" level if PERISCOPE_LOG is not set. Output goes to
/// stderr so stdout stays reserved for query results.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Backoff for storage connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: `max_retries` (at least one)
/// - Jitter enabled
pub fn connection_backoff(max_retries: u32) -> ExponentialBuilder {
    let retries = usize::try_from(max_retries.saturating_sub(1)).unwrap_or(usize::MAX);
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(retries)
        .with_jitter()
}

/// Open storage with exponential backoff retry.
///
/// # Arguments
/// * `backend` - Human-readable name for logging (e.g., "sqlite", "postgres")
/// * `connect` - Async function that attempts to open the stores
///
/// # Returns
/// The connected value on success, or the last error after `max_retries`.
pub async fn connect_with_retry<T, E, F, Fut>(
    backend: &str,
    max_retries: u32,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = connection_backoff(max_retries).build();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match connect().await {
            Ok(stores) => {
                info!(backend, attempt, "Connected to storage");
                return Ok(stores);
            }
            Err(e) => match backoff.next() {
                Some(delay) => {
                    warn!(
                        backend,
                        attempt,
                        max_retries,
                        error = %e,
                        backoff_ms = %delay.as_millis(),
                        "Failed to open storage, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(backend, attempt, error = %e, "Failed to open storage, giving up");
                    return Err(e);
                }
            },
        }
    }
}
