//! Thread-local record of the task currently being polled.
//!
//! While a spawned task is polled on a worker, [`enter`] publishes it here.
//! Futures that need to know where they run use [`with_current_task`]:
//!
//! - [`CoSchedule`](crate::runtime::CoSchedule) moves the running task onto
//!   another executor
//! - awaiting a [`Task`](crate::Task) that was never started spawns it on
//!   the awaiting task's executor
//!
//! Outside of a polled task the slot is empty and callers fall back to
//! their own behavior.

use crate::runtime::Executor;

use std::cell::RefCell;
use std::sync::Arc;

/// The view of a running task exposed to the futures it polls.
pub(crate) trait TaskContext: Send + Sync {
    /// Changes the executor the task is re-submitted to when woken.
    fn rehome(&self, executor: Arc<dyn Executor>);

    /// The executor the task currently runs on.
    fn home(&self) -> Option<Arc<dyn Executor>>;
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<dyn TaskContext>>> = const { RefCell::new(None) };
}

/// Restores the previously published task when dropped.
pub(crate) struct EnterGuard {
    previous: Option<Arc<dyn TaskContext>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TASK.with(|current| *current.borrow_mut() = previous);
    }
}

/// Publishes `task` as the current task until the guard is dropped.
///
/// Nested calls stack: dropping the inner guard brings back the outer task,
/// which happens when a task body blocks on another task inline.
pub(crate) fn enter(task: Arc<dyn TaskContext>) -> EnterGuard {
    let previous = CURRENT_TASK.with(|current| current.borrow_mut().replace(task));
    EnterGuard { previous }
}

/// Calls `f` with the task being polled on this thread, if any.
pub(crate) fn with_current_task<F, R>(f: F) -> R
where
    F: FnOnce(Option<&Arc<dyn TaskContext>>) -> R,
{
    // Clone out of the cell so `f` may itself enter a nested task.
    let task = CURRENT_TASK.with(|current| current.borrow().clone());
    f(task.as_ref())
}
