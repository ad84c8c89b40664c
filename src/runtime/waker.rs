//! Wakers used by the runtime.
//!
//! [`ThreadWaker`] unparks a thread that is blocked waiting for a future.
//! Spawned tasks implement [`ArcWake`] themselves (see `task.rs`) and turn a
//! wake into a re-submission on their home executor.

use futures::task::{self, ArcWake};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;
use std::thread::{self, Thread};

/// Wakes a parked thread.
///
/// The `notified` flag makes a wake that lands before the thread parks
/// count, so no wake-up is ever lost between a `Pending` poll and the park.
pub(crate) struct ThreadWaker {
    thread: Thread,
    notified: AtomicBool,
}

impl ThreadWaker {
    /// Creates a waker bound to the calling thread, together with the
    /// [`Waker`] handed to futures.
    pub(crate) fn current() -> (Arc<Self>, Waker) {
        let signal = Arc::new(Self {
            thread: thread::current(),
            notified: AtomicBool::new(false),
        });
        let waker = task::waker(signal.clone());

        (signal, waker)
    }

    /// Parks the calling thread until the waker has been woken at least once
    /// since the previous wait.
    pub(crate) fn wait(&self) {
        while !self.notified.swap(false, Ordering::Acquire) {
            thread::park();
        }
    }
}

impl ArcWake for ThreadWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.notified.store(true, Ordering::Release);
        arc_self.thread.unpark();
    }
}
