//! Error types shared by the runtime, stream and networking layers.
//!
//! Socket failures are surfaced immediately as [`Error::Connection`] or
//! [`Error::Io`]. Failures inside a task are captured as a [`TaskError`] and
//! only handed back when somebody asks for the task's result.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every error the crate can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Address resolution, connect, bind or listen failed.
    #[error("connection error: {context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A send, receive, read or write failed at the OS level.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A flush sent fewer bytes than were buffered.
    #[error("short transfer: expected {expected} bytes, transferred {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// The computation wrapped by a task or job failed.
    #[error("task failed: {0}")]
    Task(#[from] TaskError),

    /// The result of a cancelled task was requested.
    #[error("task was cancelled")]
    Cancelled,

    /// The result of a task that was never run nor scheduled was requested.
    #[error("task has not been started")]
    NotStarted,

    /// The task's value was already moved out by a previous `join`.
    #[error("task result was already taken")]
    ResultTaken,

    /// The requested executor or dispatcher kind does not exist yet.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Work was submitted to an executor that has been shut down.
    #[error("executor has been shut down")]
    Rejected,

    /// The stream was already closed.
    #[error("stream is closed")]
    Closed,

    /// A builder was given values it cannot work with.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `Server::start` was called on a server that is already running.
    #[error("server was already started")]
    AlreadyStarted,
}

impl Error {
    pub(crate) fn connection(context: impl Into<String>, source: io::Error) -> Self {
        Error::Connection {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` if this reports a cancelled task.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Failure captured while running a task body.
///
/// Cheap to clone so that the same captured error can be re-raised on every
/// `get_result` call and propagated unchanged through `then_apply` chains.
#[derive(Clone, thiserror::Error)]
pub enum TaskError {
    /// The body panicked; the payload message is kept.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The body returned an error.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The task could not be resumed because its executor shut down.
    #[error("executor shut down before the task finished")]
    Rejected,
}

impl TaskError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        TaskError::Panicked(message)
    }

    pub(crate) fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TaskError::Failed(Arc::new(error))
    }

    /// Turns the error a caller saw on an upstream task into the error the
    /// downstream task fails with. Captured task errors pass through as-is.
    pub(crate) fn from_upstream(error: Error) -> Self {
        match error {
            Error::Task(inner) => inner,
            other => TaskError::failed(other),
        }
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Panicked(message) => f.debug_tuple("Panicked").field(message).finish(),
            TaskError::Failed(error) => f.debug_tuple("Failed").field(&error.to_string()).finish(),
            TaskError::Rejected => f.write_str("Rejected"),
        }
    }
}
