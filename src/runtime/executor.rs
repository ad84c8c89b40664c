//! Thread-backed executors.
//!
//! An executor owns one or more worker threads that pull jobs from a shared
//! [`WorkQueue`]. [`ExecutorExt::execute`] wraps a closure into a job and
//! returns a [`JoinHandle`] for its result.
//!
//! # Shutdown
//!
//! [`Executor::shutdown`] stops accepting work, lets the workers drain what
//! is already queued and joins them. It is idempotent and never joins the
//! thread it is called from, so a job may shut down its own executor.
//!
//! # Example
//!
//! ```ignore
//! use spindle::{Executors, ExecutorExt};
//!
//! let pool = Executors::new_fixed_thread_pool(4)?;
//! let handle = pool.execute(|| 6 * 7);
//! assert_eq!(handle.join()?, 42);
//! pool.shutdown();
//! ```

use crate::error::{Error, Result, TaskError};
use crate::runtime::block_on::block_on;
use crate::runtime::lock;
use crate::runtime::queue::WorkQueue;

use futures::channel::oneshot;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread;

/// A unit of work accepted by an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs queued jobs on dedicated worker threads.
pub trait Executor: Send + Sync {
    /// Enqueues a job. This is the only way work enters an executor.
    ///
    /// # Errors
    /// [`Error::Rejected`] if the executor has been shut down; the job is
    /// dropped without running.
    fn submit(&self, job: Job) -> Result<()>;

    /// Stops accepting work, drains the queue and joins the workers.
    fn shutdown(&self);

    /// Returns `true` once [`Self::shutdown`] has been requested.
    fn is_shutdown(&self) -> bool;

    /// Number of worker threads.
    fn worker_count(&self) -> usize;
}

/// Future-returning submission, available on every [`Executor`].
pub trait ExecutorExt: Executor {
    /// Runs `f` on a worker and returns a handle to its result.
    ///
    /// A panic inside `f` is captured and reported through the handle as
    /// [`Error::Task`]. If the executor is already shut down the handle
    /// resolves to [`Error::Rejected`].
    fn execute<F, T>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f)).map_err(TaskError::from_panic);
            // The caller may have dropped the handle; nobody is waiting then.
            let _ = sender.send(outcome);
        });

        if self.submit(job).is_err() {
            tracing::warn!("work submitted after shutdown was rejected");
        }

        JoinHandle { receiver }
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

/// Handle to the result of a job submitted with [`ExecutorExt::execute`].
///
/// Await it from async code or call [`Self::join`] to block.
#[must_use = "dropping a JoinHandle discards the job's result"]
pub struct JoinHandle<T> {
    receiver: oneshot::Receiver<std::result::Result<T, TaskError>>,
}

impl<T> JoinHandle<T> {
    /// Blocks the calling thread until the job has finished.
    pub fn join(self) -> Result<T> {
        block_on(self)
    }

    /// Returns the result if the job has already finished.
    pub fn try_join(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(Some(outcome)) => Some(outcome.map_err(Error::Task)),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(Error::Rejected)),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome.map_err(Error::Task)),
            // The job was dropped without running: it was rejected.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Rejected)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Worker threads sharing one queue. Backs both public executor variants.
pub(crate) struct ThreadPool {
    name: String,
    queue: Arc<WorkQueue>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    size: usize,
}

impl ThreadPool {
    pub(crate) fn new(name: &str, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config(format!(
                "{name} needs at least one worker thread"
            )));
        }

        let queue = Arc::new(WorkQueue::new());
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let worker_queue = queue.clone();
            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&worker_queue));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    // Release the workers already started before bailing.
                    queue.stop();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::Io(error));
                }
            }
        }

        tracing::debug!(executor = name, workers = size, "executor started");

        Ok(Self {
            name: name.to_string(),
            queue,
            workers: Mutex::new(workers),
            size,
        })
    }

    pub(crate) fn submit(&self, job: Job) -> Result<()> {
        self.queue.push(job).map_err(|_rejected| Error::Rejected)
    }

    pub(crate) fn shutdown(&self) {
        if !self.queue.stop() {
            return;
        }

        tracing::debug!(
            executor = %self.name,
            pending = self.queue.len(),
            "executor shutting down"
        );

        let workers = std::mem::take(&mut *lock(&self.workers));
        let current = thread::current().id();

        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }

        tracing::debug!(executor = %self.name, "executor stopped");
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.queue.is_stopped()
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(queue: &WorkQueue) {
    while let Some(job) = queue.next() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(
                error = %TaskError::from_panic(payload),
                "job panicked on executor worker"
            );
        }
    }
}

/// Executor with exactly one worker: jobs run one at a time, in submission
/// order.
pub struct SingleThreadExecutor {
    pool: ThreadPool,
}

impl SingleThreadExecutor {
    /// Starts the worker thread.
    pub fn new() -> Result<Self> {
        Self::named("spindle-single")
    }

    pub(crate) fn named(name: &str) -> Result<Self> {
        Ok(Self {
            pool: ThreadPool::new(name, 1)?,
        })
    }
}

impl Executor for SingleThreadExecutor {
    fn submit(&self, job: Job) -> Result<()> {
        self.pool.submit(job)
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    fn worker_count(&self) -> usize {
        self.pool.size()
    }
}

/// Executor with a fixed number of workers sharing one queue.
///
/// Every job runs exactly once; no order is guaranteed between jobs picked
/// up by different workers.
pub struct FixedThreadPoolExecutor {
    pool: ThreadPool,
}

impl FixedThreadPoolExecutor {
    /// Starts `size` worker threads.
    ///
    /// # Errors
    /// [`Error::Config`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        Self::named("spindle-pool", size)
    }

    pub(crate) fn named(name: &str, size: usize) -> Result<Self> {
        Ok(Self {
            pool: ThreadPool::new(name, size)?,
        })
    }
}

impl Executor for FixedThreadPoolExecutor {
    fn submit(&self, job: Job) -> Result<()> {
        self.pool.submit(job)
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    fn worker_count(&self) -> usize {
        self.pool.size()
    }
}
