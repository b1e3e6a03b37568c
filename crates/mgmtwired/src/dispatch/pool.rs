//! Worker pool executing queued requests off the connection threads.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use thiserror::Error;
use tracing::{debug, error};

use super::DISPATCH_TARGET;

/// Job handler shared by every worker.
pub type JobHandler<J> = Arc<dyn Fn(J) + Send + Sync>;

/// Errors raised while starting the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configuration asked for no workers.
    #[error("execution pool needs at least one worker thread")]
    ZeroThreads,
    /// A worker thread could not be spawned.
    #[error("failed to spawn execution worker: {source}")]
    Spawn {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Submission refused because the workers have stopped. The job is handed
/// back so the caller can answer it.
#[derive(Debug)]
pub struct PoolStopped<J>(J);

impl<J> PoolStopped<J> {
    /// Recovers the rejected job.
    pub fn into_job(self) -> J {
        self.0
    }
}

/// Fixed set of worker threads fed by an unbounded queue.
///
/// The queue never refuses work for load. Callers bound what they submit.
pub struct ExecutionPool<J: Send + 'static> {
    sender: Option<Sender<J>>,
    workers: Vec<JoinHandle<()>>,
}

impl<J: Send + 'static> ExecutionPool<J> {
    /// Starts `threads` workers sharing one queue.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] when `threads` is zero or a worker cannot be
    /// spawned.
    pub fn new(threads: usize, handler: JobHandler<J>) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(PoolError::ZeroThreads);
        }
        let (sender, receiver) = unbounded::<J>();
        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(threads),
        };
        for index in 0..threads {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            let worker = thread::Builder::new()
                .name(format!("mgmtwire-exec-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        // Handlers answer their own failures; a panic here
                        // must not take the worker down with it.
                        if panic::catch_unwind(AssertUnwindSafe(|| handler(job))).is_err() {
                            error!(
                                target: DISPATCH_TARGET,
                                worker = index,
                                "execution worker recovered from a panicking job"
                            );
                        }
                    }
                })
                .map_err(|source| PoolError::Spawn { source })?;
            pool.workers.push(worker);
        }
        debug!(target: DISPATCH_TARGET, threads, "execution pool started");
        Ok(pool)
    }

    /// Queues a job without blocking.
    ///
    /// # Errors
    ///
    /// Returns the job inside [`PoolStopped`] when every worker has exited.
    pub fn submit(&self, job: J) -> Result<(), PoolStopped<J>> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(PoolStopped(job));
        };
        sender.send(job).map_err(|error| PoolStopped(error.into_inner()))
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Jobs waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }
}

impl<J: Send + 'static> Drop for ExecutionPool<J> {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!(target: DISPATCH_TARGET, "execution worker exited abnormally");
            }
        }
    }
}
