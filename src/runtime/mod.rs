//! Runtime subsystem modules.
//!
//! - [`executor`]: the [`Executor`] trait, the thread-pool variants and
//!   [`JoinHandle`]
//! - [`executors`]: the [`Executors`] factory
//! - [`dispatcher`]: named scheduling roles on top of executors
//! - [`block_on`]: drive a future on the calling thread

pub mod block_on;
pub(crate) mod context;
pub mod dispatcher;
pub mod executor;
pub mod executors;
pub(crate) mod queue;
pub(crate) mod waker;

pub use block_on::block_on;
pub use dispatcher::{CoSchedule, Dispatcher, DispatcherKind, Dispatchers};
pub use executor::{
    Executor, ExecutorExt, FixedThreadPoolExecutor, Job, JoinHandle, SingleThreadExecutor,
};
pub use executors::{ExecutorKind, Executors};

use std::sync::{Mutex, MutexGuard, PoisonError};

// Jobs never run while one of our locks is held, so a poisoned lock only
// means a panic unwound through bookkeeping code; the data is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
