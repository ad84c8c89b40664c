//! Single-shot asynchronous computations.
//!
//! A [`Task`] wraps a body (a closure or a future) that runs at most once and
//! records its outcome. Tasks are lazy: nothing happens until the task is
//! run inline with [`Task::run`], scheduled with [`Task::spawn_on`], or
//! awaited.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted ──► Running ──► Completed | Failed | Cancelled
//! ```
//!
//! The first terminal transition wins. A body that finishes after the task
//! was cancelled has its result discarded.
//!
//! # Running a task
//!
//! ```ignore
//! use spindle::Task;
//!
//! let task = Task::create(|| 6 * 7);
//! task.run();
//! assert_eq!(task.get_result()?, 42);
//! ```
//!
//! # Chaining
//!
//! ```ignore
//! let doubled = Task::create(|| 21).then_apply(|v| v * 2);
//! doubled.run();
//! assert_eq!(doubled.join()?, 42);
//! ```
//!
//! # Future bodies
//!
//! [`Task::from_future`] accepts any `Send` future. Run inline it is driven
//! by [`block_on`](crate::runtime::block_on); spawned on an executor it is
//! polled by a worker and re-submitted to its home executor each time its
//! waker fires, so a suspended task never occupies a worker.
//!
//! ```ignore
//! let pool = Executors::new_fixed_thread_pool(2)?;
//! let first = Task::create(|| 20);
//! let second = Task::from_future(async move { first.await.map(|v| v + 22) });
//! second.spawn_on(pool.clone())?;
//! assert_eq!(second.join()??, 42);
//! ```
//!
//! # Errors
//!
//! Errors and panics raised by the body are captured as a [`TaskError`] and
//! deferred until someone asks for the result. A failure nobody observed is
//! reported with `tracing::warn!` when the last handle goes away.

use crate::error::{Error, Result, TaskError};
use crate::runtime::block_on::block_on;
use crate::runtime::context::{self, TaskContext};
use crate::runtime::{Executor, lock};

use futures::FutureExt;
use futures::task::{self as futures_task, ArcWake};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::Duration;

/// Snapshot of a task's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// `Completed` holds `None` once the value has been moved out by `join`.
enum Slot<T> {
    NotStarted,
    Running,
    Completed(Option<T>),
    Failed(TaskError),
    Cancelled,
}

impl<T> Slot<T> {
    fn status(&self) -> TaskStatus {
        match self {
            Self::NotStarted => TaskStatus::NotStarted,
            Self::Running => TaskStatus::Running,
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed(_) => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }
}

struct State<T> {
    slot: Slot<T>,
    /// Handed to an executor but not picked up yet.
    scheduled: bool,
    /// Whether a failure has been reported to a caller.
    observed: bool,
    continuation: Option<Waker>,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        match self.slot {
            Slot::Running => true,
            Slot::NotStarted => self.scheduled,
            _ => false,
        }
    }

    /// Moves the outcome out of a terminal slot.
    fn take_outcome(&mut self) -> Result<T> {
        match &mut self.slot {
            Slot::Completed(value) => value.take().ok_or(Error::ResultTaken),
            Slot::Failed(error) => {
                self.observed = true;
                Err(Error::Task(error.clone()))
            }
            Slot::Cancelled => Err(Error::Cancelled),
            Slot::NotStarted | Slot::Running => Err(Error::NotStarted),
        }
    }
}

type CallBody<T> = Box<dyn FnOnce() -> std::result::Result<T, TaskError> + Send>;
type PollBody<T> = Pin<Box<dyn Future<Output = std::result::Result<T, TaskError>> + Send>>;

enum Body<T> {
    Call(CallBody<T>),
    Poll(PollBody<T>),
}

// Scheduling states of a future body spawned on an executor.
const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const POLLING: u8 = 2;
const NOTIFIED: u8 = 3;
const DONE: u8 = 4;

struct Inner<T> {
    state: Mutex<State<T>>,
    finished: Condvar,
    body: Mutex<Option<Body<T>>>,
    /// Executor a woken future body is re-submitted to.
    home: Mutex<Option<Arc<dyn Executor>>>,
    poll_state: AtomicU8,
}

/// A single-shot computation producing a `T`.
///
/// `Task` is a cheap handle: clones refer to the same computation.
pub struct Task<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Task<T> {
    fn with_body(body: Body<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    slot: Slot::NotStarted,
                    scheduled: false,
                    observed: false,
                    continuation: None,
                }),
                finished: Condvar::new(),
                body: Mutex::new(Some(body)),
                home: Mutex::new(None),
                poll_state: AtomicU8::new(IDLE),
            }),
        }
    }

    /// Creates a task from an infallible closure.
    pub fn create<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::with_body(Body::Call(Box::new(move || Ok(f()))))
    }

    /// Creates a task from a fallible closure. An `Err` fails the task with
    /// that error as its source.
    pub fn try_create<F, E>(f: F) -> Self
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::with_body(Body::Call(Box::new(move || f().map_err(TaskError::failed))))
    }

    /// Creates a task whose body is a future.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::with_body(Body::Poll(Box::pin(future.map(Ok))))
    }

    /// Runs the body on the calling thread.
    ///
    /// Does nothing if the task has already started, finished, been
    /// cancelled, or been handed to an executor.
    pub fn run(&self) {
        if lock(&self.inner.state).scheduled {
            return;
        }
        self.inner.run_body();
    }

    /// Schedules the task on `executor` instead of running it inline.
    ///
    /// Scheduling a task that is already scheduled or started is a no-op.
    ///
    /// # Errors
    /// [`Error::Rejected`] if the executor has been shut down. The task is
    /// left `NotStarted`.
    pub fn spawn_on(&self, executor: Arc<dyn Executor>) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            if !matches!(state.slot, Slot::NotStarted) || state.scheduled {
                return Ok(());
            }
            state.scheduled = true;
        }

        *lock(&self.inner.home) = Some(executor.clone());

        let polled = matches!(lock(&self.inner.body).as_ref(), Some(Body::Poll(_)));
        let inner = self.inner.clone();
        let submitted = if polled {
            inner.poll_state.store(SCHEDULED, Ordering::Release);
            executor.submit(Box::new(move || inner.poll_once()))
        } else {
            executor.submit(Box::new(move || inner.run_body()))
        };

        if let Err(error) = submitted {
            self.inner.poll_state.store(IDLE, Ordering::Release);
            let continuation = {
                let mut state = lock(&self.inner.state);
                state.scheduled = false;
                state.continuation.take()
            };
            // Waiters blocked on the scheduled task must see it is idle again.
            self.inner.finished.notify_all();
            if let Some(waker) = continuation {
                waker.wake();
            }
            return Err(error);
        }

        Ok(())
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TaskStatus {
        lock(&self.inner.state).slot.status()
    }

    /// Returns `true` once the task reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    /// Blocks until the task finishes and returns a copy of its value.
    ///
    /// A task that was never run nor scheduled returns
    /// [`Error::NotStarted`] immediately instead of blocking.
    ///
    /// Calling this from a worker of the executor the task is scheduled on
    /// can deadlock a single-worker executor.
    ///
    /// # Errors
    /// - [`Error::Task`] with the captured failure, as often as asked
    /// - [`Error::Cancelled`] if the task was cancelled
    /// - [`Error::ResultTaken`] if the value was moved out by [`Self::join`]
    pub fn get_result(&self) -> Result<T>
    where
        T: Clone,
    {
        let mut state = self.inner.wait_terminal();
        if let Slot::Completed(Some(value)) = &state.slot {
            return Ok(value.clone());
        }
        state.take_outcome()
    }

    /// Blocks until the task finishes and moves its value out.
    pub fn join(self) -> Result<T> {
        self.inner.wait_terminal().take_outcome()
    }

    /// Cooperatively cancels the task.
    ///
    /// A task that has not started yet becomes `Cancelled` and its body is
    /// dropped. A running closure is not interrupted, but its result is
    /// discarded. A running future body is dropped at its next wake-up.
    ///
    /// Returns `false` if the task had already finished.
    pub fn cancel(&self) -> bool {
        let (was_started, continuation) = {
            let mut state = lock(&self.inner.state);
            let was_started = match state.slot {
                Slot::NotStarted => false,
                Slot::Running => true,
                _ => return false,
            };
            state.slot = Slot::Cancelled;
            (was_started, state.continuation.take())
        };

        if !was_started {
            drop(lock(&self.inner.body).take());
        }

        self.inner.finished.notify_all();
        if let Some(waker) = continuation {
            waker.wake();
        }

        true
    }

    /// Returns a task that feeds this task's value to `f`.
    ///
    /// The new task runs this one inline if nobody has started it, then
    /// waits for it. A failure of this task is propagated unchanged.
    pub fn then_apply<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Task::with_body(Body::Call(Box::new(move || {
            self.run();
            let value = self.join().map_err(TaskError::from_upstream)?;
            Ok(f(value))
        })))
    }

    /// Like [`Self::then_apply`] for a consumer that produces nothing.
    pub fn then_accept<F>(self, f: F) -> Task<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.then_apply(f)
    }
}

impl Task<()> {
    /// A task that completes after at least `duration`.
    pub fn delay(duration: Duration) -> Self {
        Task::create(move || thread::sleep(duration))
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("status", &lock(&self.inner.state).slot.status())
            .finish()
    }
}

impl<T: Send + 'static> Inner<T> {
    fn wait_terminal(&self) -> MutexGuard<'_, State<T>> {
        let mut state = lock(&self.state);
        while state.is_pending() {
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }

    /// `NotStarted -> Running`. Returns `false` if another caller got there
    /// first or the task was cancelled.
    fn start(&self) -> bool {
        let mut state = lock(&self.state);
        if !matches!(state.slot, Slot::NotStarted) {
            return false;
        }
        state.slot = Slot::Running;
        state.scheduled = false;
        true
    }

    fn run_body(&self) {
        if !self.start() {
            return;
        }

        let body = lock(&self.body).take();
        let outcome = match body {
            Some(Body::Call(f)) => panic::catch_unwind(AssertUnwindSafe(f))
                .unwrap_or_else(|payload| Err(TaskError::from_panic(payload))),
            Some(Body::Poll(future)) => block_on(AssertUnwindSafe(future).catch_unwind())
                .unwrap_or_else(|payload| Err(TaskError::from_panic(payload))),
            None => return,
        };

        self.finish(outcome);
    }

    /// Records the outcome unless the task already reached a terminal state,
    /// then wakes everyone waiting for it.
    fn finish(&self, outcome: std::result::Result<T, TaskError>) {
        let continuation = {
            let mut state = lock(&self.state);
            if !matches!(state.slot, Slot::Running | Slot::NotStarted) {
                return;
            }
            state.slot = match outcome {
                Ok(value) => Slot::Completed(Some(value)),
                Err(error) => {
                    tracing::debug!(%error, "task failed");
                    Slot::Failed(error)
                }
            };
            state.scheduled = false;
            state.continuation.take()
        };

        self.finished.notify_all();
        if let Some(waker) = continuation {
            waker.wake();
        }
    }

    /// Polls a spawned future body once on the current worker.
    fn poll_once(self: &Arc<Self>) {
        self.poll_state.store(POLLING, Ordering::Release);

        {
            let mut state = lock(&self.state);
            match state.slot {
                Slot::NotStarted => {
                    state.slot = Slot::Running;
                    state.scheduled = false;
                }
                Slot::Running => {}
                _ => {
                    drop(state);
                    self.poll_state.store(DONE, Ordering::Release);
                    drop(lock(&self.body).take());
                    return;
                }
            }
        }

        let mut body = lock(&self.body);
        let Some(Body::Poll(future)) = body.as_mut() else {
            self.poll_state.store(DONE, Ordering::Release);
            return;
        };

        let waker = futures_task::waker(self.clone());
        let mut cx = Context::from_waker(&waker);
        let polled = {
            let _entered = context::enter(self.clone());
            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
        };

        let outcome = match polled {
            Ok(Poll::Pending) => {
                drop(body);
                if self
                    .poll_state
                    .compare_exchange(POLLING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Woken while polling: go around again.
                    self.poll_state.store(SCHEDULED, Ordering::Release);
                    self.resubmit();
                }
                return;
            }
            Ok(Poll::Ready(outcome)) => outcome,
            Err(payload) => Err(TaskError::from_panic(payload)),
        };

        *body = None;
        drop(body);
        self.poll_state.store(DONE, Ordering::Release);
        self.finish(outcome);
    }

    fn resubmit(self: &Arc<Self>) {
        let home = lock(&self.home).clone();
        let inner = self.clone();
        let submitted = match home {
            Some(executor) => executor.submit(Box::new(move || inner.poll_once())),
            None => Err(Error::Rejected),
        };

        if submitted.is_err() {
            tracing::warn!("woken task could not be re-submitted to its executor");
            self.poll_state.store(DONE, Ordering::Release);
            self.finish(Err(TaskError::Rejected));
        }
    }
}

impl<T: Send + 'static> ArcWake for Inner<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let mut current = arc_self.poll_state.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => SCHEDULED,
                POLLING => NOTIFIED,
                _ => return,
            };
            match arc_self.poll_state.compare_exchange(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if next == SCHEDULED => {
                    arc_self.resubmit();
                    return;
                }
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl<T: Send + 'static> TaskContext for Inner<T> {
    fn rehome(&self, executor: Arc<dyn Executor>) {
        *lock(&self.home) = Some(executor);
    }

    fn home(&self) -> Option<Arc<dyn Executor>> {
        lock(&self.home).clone()
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Slot::Failed(error) = &state.slot {
            if !state.observed {
                tracing::warn!(%error, "task failed and its error was never observed");
            }
        }
    }
}

/// Future returned by awaiting a [`Task`].
///
/// Resolves to the task's value, moved out as with [`Task::join`].
pub struct TaskFuture<T> {
    task: Task<T>,
}

impl<T: Send + 'static> IntoFuture for Task<T> {
    type Output = Result<T>;
    type IntoFuture = TaskFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        TaskFuture { task: self }
    }
}

impl<T: Send + 'static> Future for TaskFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = &self.task;

        loop {
            {
                let mut state = lock(&task.inner.state);
                if state.is_pending() {
                    // Single slot: the latest registration replaces the previous one.
                    state.continuation = Some(cx.waker().clone());
                    return Poll::Pending;
                }
                if !matches!(state.slot, Slot::NotStarted) {
                    return Poll::Ready(state.take_outcome());
                }
            }

            // Nobody started it: follow the awaiting task onto its executor,
            // or run inline outside of one.
            let home = context::with_current_task(|current| current.and_then(|t| t.home()));
            match home {
                Some(executor) => {
                    if let Err(error) = task.spawn_on(executor) {
                        return Poll::Ready(Err(error));
                    }
                }
                None => task.run(),
            }
        }
    }
}
