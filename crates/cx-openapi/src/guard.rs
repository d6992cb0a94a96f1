//! Deadline and cancellation wrapper for suspension points.

use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Await `fut`, giving up when `cancel` fires or `timeout` elapses.
///
/// Cancellation is checked first so an already-cancelled session never
/// starts new work.
pub async fn guarded<F, T>(
    cancel: &CancellationToken,
    timeout: Duration,
    stage: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled(stage)),
        outcome = tokio::time::timeout(timeout, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout { stage, timeout }),
        },
    }
}
