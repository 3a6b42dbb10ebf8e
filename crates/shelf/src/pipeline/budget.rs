use std::time::Duration;

use super::error::IngestError;

/// Runs CPU-bound work on the blocking pool under a time budget.
///
/// On timeout the caller stops waiting; the blocking thread itself runs to
/// completion and its result is dropped.
pub async fn run_with_budget<T, F>(budget: Duration, work: F) -> Result<T, IngestError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(budget, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(IngestError::ParserCrashed(join_error.to_string())),
        Err(_) => Err(IngestError::Timeout(budget)),
    }
}
