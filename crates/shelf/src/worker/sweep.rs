//! Recovery for records left unfinished by a crash, an aborted run or an
//! interrupted `ingest`.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};

use crate::db::{book_repo, Database, DatabaseError};
use crate::error::ShelfError;
use crate::worker::job::{IngestRequest, JobResult};
use crate::worker::pool::WorkerPool;

/// Requests for records whose last transition is older than `stale_after`.
pub fn stale_requests(
    db: &Database,
    stale_after: Duration,
) -> Result<Vec<IngestRequest>, DatabaseError> {
    let age = chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::days(36_500));
    let cutoff = Utc::now() - age;

    let records = book_repo::find_stale(db, cutoff)?;
    Ok(records.iter().map(IngestRequest::from_record).collect())
}

/// What a sweep found and what became of it.
#[derive(Debug)]
pub struct SweepReport {
    pub stale: usize,
    /// Fewer than `stale` when the pool stopped early.
    pub results: Vec<JobResult>,
}

/// Runs every stale record through `pool` again. `on_result` sees each
/// result as it arrives.
pub fn requeue_stale<F>(
    db: &Database,
    pool: &WorkerPool,
    stale_after: Duration,
    on_result: F,
) -> Result<SweepReport, ShelfError>
where
    F: FnMut(&JobResult),
{
    let requests = stale_requests(db, stale_after)?;
    let stale = requests.len();
    info!("Re-queueing {} stale records", stale);
    for request in &requests {
        debug!("Re-queueing stale book {}", request.book_id);
    }

    let results = pool.process(requests, on_result);
    Ok(SweepReport { stale, results })
}
