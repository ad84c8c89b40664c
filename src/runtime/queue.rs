//! Thread-safe work queue shared by the workers of one executor.
//!
//! A FIFO of boxed jobs behind a single mutex, paired with a condition
//! variable so idle workers sleep instead of polling.

use crate::runtime::executor::Job;
use crate::runtime::lock;

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};

struct State {
    jobs: VecDeque<Job>,
    stop: bool,
}

/// A blocking FIFO queue of jobs with a stop flag.
///
/// Producers push from any thread. Workers block in [`Self::next`] until a
/// job is available or the queue is stopped and fully drained.
pub(crate) struct WorkQueue {
    state: Mutex<State>,
    available: Condvar,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                jobs: VecDeque::new(),
                stop: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueues a job at the back of the queue.
    ///
    /// Hands the job back if the queue was stopped; the stop flag and the
    /// push are checked under the same lock, so a job is either queued (and
    /// will run) or returned, never lost.
    pub(crate) fn push(&self, job: Job) -> Result<(), Job> {
        let mut state = lock(&self.state);
        if state.stop {
            return Err(job);
        }

        state.jobs.push_back(job);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Blocks until a job is available and dequeues it.
    ///
    /// Returns `None` once the queue is stopped and no work is left, which
    /// tells the calling worker to exit.
    pub(crate) fn next(&self) -> Option<Job> {
        let mut state = lock(&self.state);

        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.stop {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sets the stop flag and wakes every worker.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub(crate) fn stop(&self) -> bool {
        let mut state = lock(&self.state);
        if state.stop {
            return false;
        }
        state.stop = true;
        drop(state);

        self.available.notify_all();
        true
    }

    pub(crate) fn is_stopped(&self) -> bool {
        lock(&self.state).stop
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).jobs.len()
    }
}
