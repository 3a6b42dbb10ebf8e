use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use tokio::runtime::Handle;

use crate::error::WorkerError;
use crate::pipeline::IngestionJob;
use crate::worker::job::{IngestRequest, JobResult};

/// How often an idle worker re-checks the shutdown flag.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Fixed set of worker threads pulling requests from a bounded queue.
///
/// Workers drive each job to completion on the shared tokio runtime behind
/// `runtime`, so storage clients built on that runtime stay usable.
pub struct WorkerPool {
    requests: Sender<IngestRequest>,
    results: Receiver<JobResult>,
    threads: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

/// Stops a pool from another thread, e.g. a signal handler.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl WorkerPool {
    pub fn new(
        job: Arc<IngestionJob>,
        runtime: Handle,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be at least 1".to_string(),
            ));
        }

        let capacity = worker_count * 2;
        let (requests, request_queue) = bounded::<IngestRequest>(capacity);
        let (result_queue, results) = bounded::<JobResult>(capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let threads = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    requests: request_queue.clone(),
                    results: result_queue.clone(),
                    stop: Arc::clone(&stop),
                    job: Arc::clone(&job),
                    runtime: runtime.clone(),
                };
                thread::Builder::new()
                    .name(format!("shelf-worker-{}", id))
                    .spawn(move || worker.run())
                    .map_err(|e| WorkerError::SpawnFailed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Ingestion pool running with {} worker(s)", worker_count);

        Ok(Self {
            requests,
            results,
            threads,
            stop,
        })
    }

    /// Queues a request, blocking while the queue is full.
    pub fn submit(&self, request: IngestRequest) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }
        self.requests
            .send(request)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.results.try_recv().ok()
    }

    /// Blocks for the next result. `None` once every worker has stopped.
    pub fn recv_result(&self) -> Option<JobResult> {
        self.results.recv().ok()
    }

    /// Submits `requests` from a helper thread while collecting their
    /// results here, so a batch larger than the queues never stalls.
    /// Returns early if the pool stops before every request ran.
    pub fn process<F>(&self, requests: Vec<IngestRequest>, mut on_result: F) -> Vec<JobResult>
    where
        F: FnMut(&JobResult),
    {
        let expected = requests.len();

        thread::scope(|scope| {
            scope.spawn(move || {
                for request in requests {
                    if let Err(e) = self.submit(request) {
                        warn!("Stopped queueing: {}", e);
                        break;
                    }
                }
            });

            let mut results = Vec::with_capacity(expected);
            while results.len() < expected {
                match self.recv_result() {
                    Some(result) => {
                        on_result(&result);
                        results.push(result);
                    }
                    None => break,
                }
            }
            results
        })
    }

    /// Workers finish their current book and exit; queued books stay `pending`.
    pub fn shutdown(&self) {
        info!("Stopping ingestion pool");
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.stop))
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins all workers. Queued requests are still
    /// processed unless shutdown was requested.
    pub fn wait(self) {
        drop(self.requests);

        let mut panicked = 0;
        for thread in self.threads {
            let name = thread.thread().name().unwrap_or("shelf-worker").to_string();
            if thread.join().is_err() {
                error!("{} panicked", name);
                panicked += 1;
            }
        }

        if panicked > 0 {
            warn!("Ingestion pool stopped, {} worker(s) panicked", panicked);
        } else {
            info!("Ingestion pool stopped");
        }
    }
}

struct Worker {
    id: usize,
    requests: Receiver<IngestRequest>,
    results: Sender<JobResult>,
    stop: Arc<AtomicBool>,
    job: Arc<IngestionJob>,
    runtime: Handle,
}

impl Worker {
    fn run(self) {
        debug!("shelf-worker-{} waiting for books", self.id);

        while !self.stop.load(Ordering::Relaxed) {
            let request = match self.requests.recv_timeout(IDLE_POLL) {
                Ok(request) => request,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            debug!("shelf-worker-{} took book {}", self.id, request.book_id);
            let result = self.runtime.block_on(self.job.run(request));

            if self.results.send(result).is_err() {
                // Nobody is collecting results any more.
                break;
            }
        }

        debug!("shelf-worker-{} exiting", self.id);
    }
}
