//! Bounded worker pool for document pipelines.
//!
//! Submissions queue without bound and are admitted strictly in arrival
//! order: a single dispatcher task holds the queue and will not pick up the
//! next job until a semaphore permit is free, so at most `worker_count` jobs
//! run at once. Each job runs inside its own spawned task, so a panic in one
//! document's pipeline is reported to its submitter without taking down the
//! pool or its neighbours.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, error};

/// Errors surfaced to a submitter.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was shut down before the job could run.
    #[error("worker pool is closed")]
    Closed,
    /// The job's task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Panicked(String),
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to the pool. Cheap to clone; dropping every handle shuts it down.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Start a pool that runs at most `worker_count` jobs concurrently.
    pub fn new(worker_count: usize) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let dispatcher_active = Arc::clone(&active);
        let dispatcher_peak = Arc::clone(&peak);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let running = dispatcher_active.fetch_add(1, Ordering::SeqCst) + 1;
                dispatcher_peak.fetch_max(running, Ordering::SeqCst);

                let active = Arc::clone(&dispatcher_active);
                tokio::spawn(async move {
                    job.await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                });
            }
            debug!("worker pool dispatcher stopped");
        });

        Self { tx, active, peak }
    }

    /// Queue `work` and wait for its result.
    ///
    /// The future runs in its own task; if it panics the submitter gets
    /// [`PoolError::Panicked`] instead of a propagated panic.
    pub async fn run<F, T>(&self, work: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = match tokio::spawn(work).await {
                Ok(value) => Ok(value),
                Err(join_error) => {
                    error!(error = %join_error, "worker task failed");
                    Err(PoolError::Panicked(join_error.to_string()))
                }
            };
            let _ = result_tx.send(outcome);
        });

        self.tx.send(job).map_err(|_| PoolError::Closed)?;
        result_rx.await.map_err(|_| PoolError::Closed)?
    }

    /// Jobs currently running.
    pub fn active_now(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest concurrency observed since the pool started.
    pub fn peak_active(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
