pub mod job;
pub mod pool;
pub mod sweep;

pub use job::{IngestRequest, JobOutcome, JobResult, UploadHandle};
pub use pool::{ShutdownHandle, WorkerPool};
pub use sweep::{requeue_stale, stale_requests, SweepReport};
