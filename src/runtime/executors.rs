//! Factory for executors.
//!
//! [`Executors`] hands out shared executors by kind. Only the single-thread
//! and fixed-pool variants are backed by an implementation; the other kinds
//! are reserved names and fail with [`Error::NotImplemented`].

use crate::error::{Error, Result};
use crate::runtime::executor::{Executor, FixedThreadPoolExecutor, SingleThreadExecutor};

use std::fmt;
use std::sync::Arc;

/// The executor variants known to the factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// One worker, FIFO order.
    SingleThread,
    /// A fixed number of workers.
    FixedThreadPool(usize),
    CachedThreadPool,
    WorkStealingPool(usize),
    Async,
    Coroutine,
    Fiber,
}

impl ExecutorKind {
    /// Returns `true` for the kinds [`Executors::new`] can build.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::SingleThread | Self::FixedThreadPool(_))
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleThread => f.write_str("single thread executor"),
            Self::FixedThreadPool(size) => write!(f, "fixed thread pool ({size} workers)"),
            Self::CachedThreadPool => f.write_str("cached thread pool"),
            Self::WorkStealingPool(size) => write!(f, "work stealing pool ({size} workers)"),
            Self::Async => f.write_str("async executor"),
            Self::Coroutine => f.write_str("coroutine executor"),
            Self::Fiber => f.write_str("fiber executor"),
        }
    }
}

/// Builds executors by kind.
pub struct Executors;

impl Executors {
    /// Builds an executor of the given kind.
    ///
    /// # Errors
    /// - [`Error::NotImplemented`] for the reserved kinds
    /// - [`Error::Config`] for a fixed pool of size zero
    ///
    /// # Example
    /// ```ignore
    /// let executor = Executors::new(ExecutorKind::FixedThreadPool(4))?;
    /// ```
    pub fn new(kind: ExecutorKind) -> Result<Arc<dyn Executor>> {
        match kind {
            ExecutorKind::SingleThread => Self::new_single_thread_executor(),
            ExecutorKind::FixedThreadPool(size) => Self::new_fixed_thread_pool(size),
            ExecutorKind::CachedThreadPool => Self::new_cached_thread_pool(),
            ExecutorKind::WorkStealingPool(size) => Self::new_work_stealing_pool(size),
            ExecutorKind::Async => Self::new_async_executor(),
            ExecutorKind::Coroutine => Self::new_coroutine_executor(),
            ExecutorKind::Fiber => Self::new_fiber_executor(),
        }
    }

    /// Builds an executor with one worker thread.
    ///
    /// Jobs run one at a time in submission order.
    ///
    /// # Returns
    /// The running executor, or [`Error::Io`] if the worker thread could not
    /// be spawned.
    ///
    /// # Example
    /// ```ignore
    /// let executor = Executors::new_single_thread_executor()?;
    /// let handle = executor.execute(|| 2 + 2);
    /// assert_eq!(handle.join()?, 4);
    /// ```
    pub fn new_single_thread_executor() -> Result<Arc<dyn Executor>> {
        Ok(Arc::new(SingleThreadExecutor::new()?))
    }

    /// Builds a pool of `size` workers sharing one FIFO queue.
    ///
    /// # Arguments
    /// * `size` - Number of worker threads, at least one
    ///
    /// # Errors
    /// - [`Error::Config`] if `size` is zero
    /// - [`Error::Io`] if a worker thread could not be spawned
    ///
    /// # Example
    /// ```ignore
    /// let pool = Executors::new_fixed_thread_pool(4)?;
    /// pool.submit(Box::new(|| println!("on a worker")))?;
    /// pool.shutdown();
    /// ```
    pub fn new_fixed_thread_pool(size: usize) -> Result<Arc<dyn Executor>> {
        Ok(Arc::new(FixedThreadPoolExecutor::new(size)?))
    }

    /// Reserved. Always [`Error::NotImplemented`].
    pub fn new_cached_thread_pool() -> Result<Arc<dyn Executor>> {
        Err(Error::NotImplemented("cached thread pool"))
    }

    /// Reserved. Always [`Error::NotImplemented`].
    pub fn new_work_stealing_pool(_parallelism: usize) -> Result<Arc<dyn Executor>> {
        Err(Error::NotImplemented("work stealing pool"))
    }

    pub fn new_async_executor() -> Result<Arc<dyn Executor>> {
        Err(Error::NotImplemented("async executor"))
    }

    pub fn new_coroutine_executor() -> Result<Arc<dyn Executor>> {
        Err(Error::NotImplemented("coroutine executor"))
    }

    pub fn new_fiber_executor() -> Result<Arc<dyn Executor>> {
        Err(Error::NotImplemented("fiber executor"))
    }
}
