//! Query services.
//!
//! Each service owns the stores it reads from and bounds every store call
//! with the configured timeout.

pub mod retention;
pub mod session_recording;

pub use retention::RetentionService;
pub use session_recording::SessionRecordingService;

use std::future::Future;
use std::time::Duration;

use tracing::error;

/// Await a store call, giving up after `limit`.
///
/// Returns the elapsed limit on timeout so callers can map it into their
/// own error type.
pub(crate) async fn bounded<F: Future>(
    limit: Option<Duration>,
    operation: &'static str,
    call: F,
) -> Result<F::Output, Duration> {
    let Some(limit) = limit else {
        return Ok(call.await);
    };
    tokio::time::timeout(limit, call).await.map_err(|_| {
        error!(operation, timeout = ?limit, "Store call timed out");
        limit
    })
}
