//! Named scheduling roles.
//!
//! A [`Dispatcher`] is an executor with a role attached. Three roles are
//! predefined and grouped in [`Dispatchers`]:
//!
//! - `Io`: a pool sized for overlapping blocking I/O
//! - `Main`: a single worker, so work runs one item at a time in FIFO order
//! - `Worker`: a pool for CPU-bound work
//!
//! Besides running closures, a dispatcher can move a running task: awaiting
//! [`Dispatcher::co_schedule`] suspends the task and resumes it on one of the
//! dispatcher's workers.
//!
//! ```ignore
//! let dispatchers = Dispatchers::global()?;
//! let task = dispatchers.worker().spawn(async move {
//!     let parsed = parse(input);
//!     dispatchers.main().co_schedule().await?;
//!     publish(parsed)
//! })?;
//! ```

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::runtime::context;
use crate::runtime::executor::{
    Executor, ExecutorExt, FixedThreadPoolExecutor, JoinHandle, SingleThreadExecutor,
};
use crate::task::Task;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Waker};

/// The predefined dispatcher roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatcherKind {
    Io,
    Main,
    Worker,
}

impl fmt::Display for DispatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => f.write_str("io"),
            Self::Main => f.write_str("main"),
            Self::Worker => f.write_str("worker"),
        }
    }
}

/// An executor acting under a named role.
#[derive(Clone)]
pub struct Dispatcher {
    kind: DispatcherKind,
    executor: Arc<dyn Executor>,
}

impl Dispatcher {
    pub fn new(kind: DispatcherKind, executor: Arc<dyn Executor>) -> Self {
        Self { kind, executor }
    }

    pub fn kind(&self) -> DispatcherKind {
        self.kind
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Runs `f` under this role; see [`ExecutorExt::execute`].
    pub fn schedule<F, T>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.executor.execute(f)
    }

    /// Spawns a future-bodied [`Task`] homed on this dispatcher.
    ///
    /// # Errors
    /// [`Error::Rejected`](crate::Error::Rejected) if the executor has been
    /// shut down.
    pub fn spawn<F>(&self, future: F) -> Result<Task<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let task = Task::from_future(future);
        task.spawn_on(self.executor.clone())?;
        Ok(task)
    }

    /// Returns a future that resumes the awaiting code on this dispatcher.
    ///
    /// Inside a spawned task the task itself moves: it is re-homed here, so
    /// later wake-ups also land on this dispatcher. Elsewhere, only the
    /// wake-up that ends this await is delivered from one of its workers.
    pub fn co_schedule(&self) -> CoSchedule {
        CoSchedule {
            executor: self.executor.clone(),
            suspended: false,
        }
    }

    /// Hands a raw continuation to this dispatcher's executor.
    pub fn resume(&self, waker: Waker) -> Result<()> {
        self.executor.submit(Box::new(move || waker.wake()))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &self.kind)
            .field("workers", &self.executor.worker_count())
            .finish()
    }
}

/// Future returned by [`Dispatcher::co_schedule`].
#[must_use = "futures do nothing unless awaited"]
pub struct CoSchedule {
    executor: Arc<dyn Executor>,
    suspended: bool,
}

impl Future for CoSchedule {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.suspended {
            return Poll::Ready(Ok(()));
        }
        self.suspended = true;

        let executor = self.executor.clone();
        let rehomed = context::with_current_task(|task| match task {
            Some(task) => {
                task.rehome(executor.clone());
                true
            }
            None => false,
        });

        if rehomed {
            // The task re-submits itself to its new home.
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        let waker = cx.waker().clone();
        match executor.submit(Box::new(move || waker.wake())) {
            Ok(()) => Poll::Pending,
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

static GLOBAL: OnceLock<Dispatchers> = OnceLock::new();

/// The three predefined dispatchers.
pub struct Dispatchers {
    io: Dispatcher,
    main: Dispatcher,
    worker: Dispatcher,
}

impl Dispatchers {
    /// Builds an owned set of dispatchers with their own pools.
    ///
    /// # Errors
    /// [`Error::Config`](crate::Error::Config) if a pool size is zero.
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let io = FixedThreadPoolExecutor::named("spindle-io", config.io_threads)?;
        let main = SingleThreadExecutor::named("spindle-main")?;
        let worker = FixedThreadPoolExecutor::named("spindle-worker", config.worker_threads)?;

        Ok(Self {
            io: Dispatcher::new(DispatcherKind::Io, Arc::new(io)),
            main: Dispatcher::new(DispatcherKind::Main, Arc::new(main)),
            worker: Dispatcher::new(DispatcherKind::Worker, Arc::new(worker)),
        })
    }

    /// The process-wide set, built with the default configuration on first
    /// use.
    ///
    /// Once [`Self::shutdown`] has been called on it, it stays shut down
    /// and rejects new work.
    pub fn global() -> Result<&'static Dispatchers> {
        if let Some(dispatchers) = GLOBAL.get() {
            return Ok(dispatchers);
        }

        // Losing the race drops our set, which shuts its pools down again.
        let built = Self::new(&DispatcherConfig::default())?;
        Ok(GLOBAL.get_or_init(|| built))
    }

    pub fn io(&self) -> &Dispatcher {
        &self.io
    }

    pub fn main(&self) -> &Dispatcher {
        &self.main
    }

    pub fn worker(&self) -> &Dispatcher {
        &self.worker
    }

    pub fn get(&self, kind: DispatcherKind) -> &Dispatcher {
        match kind {
            DispatcherKind::Io => &self.io,
            DispatcherKind::Main => &self.main,
            DispatcherKind::Worker => &self.worker,
        }
    }

    /// Shuts down all three executors, draining queued work.
    pub fn shutdown(&self) {
        for dispatcher in [&self.io, &self.main, &self.worker] {
            dispatcher.executor.shutdown();
        }
    }
}

impl fmt::Debug for Dispatchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatchers")
            .field("io", &self.io)
            .field("main", &self.main)
            .field("worker", &self.worker)
            .finish()
    }
}
