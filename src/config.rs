//! Tunables for servers and dispatchers.
//!
//! Values are validated once, when a builder is consumed; everything past
//! that point can rely on them being non-zero.

use crate::error::{Error, Result};

use std::time::Duration;

/// Size of the socket stream buffers when nothing else is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Listen backlog used when nothing else is configured.
pub const DEFAULT_BACKLOG: i32 = 128;

/// How long one accept wait lasts before the stop flag is checked again.
pub const DEFAULT_ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Number of threads the machine can run in parallel, at least one.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Settings used by [`Server`](crate::net::Server).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Workers of the server's default executor. One of them is occupied by
    /// the accept loop for as long as the server runs.
    pub worker_threads: usize,

    /// Size of each input and output buffer of a connection.
    pub buffer_size: usize,

    /// Backlog handed to `listen`.
    pub backlog: i32,

    /// Upper bound on how long the accept loop waits before re-checking the
    /// stop flag.
    pub accept_poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_threads: available_parallelism().max(2),
            buffer_size: DEFAULT_BUFFER_SIZE,
            backlog: DEFAULT_BACKLOG,
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub(crate) fn validate(self) -> Result<Self> {
        if self.worker_threads < 2 {
            return Err(Error::Config(format!(
                "a server needs at least 2 worker threads (accept loop + handlers), got {}",
                self.worker_threads
            )));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be greater than 0".into()));
        }
        if self.backlog <= 0 {
            return Err(Error::Config("backlog must be greater than 0".into()));
        }
        if self.accept_poll_interval.is_zero() {
            return Err(Error::Config(
                "accept_poll_interval must be greater than 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Pool sizes for the predefined dispatchers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Workers of the IO dispatcher.
    pub io_threads: usize,

    /// Workers of the CPU-bound Worker dispatcher.
    pub worker_threads: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let parallelism = available_parallelism();

        Self {
            io_threads: parallelism * 2,
            worker_threads: parallelism,
        }
    }
}

impl DispatcherConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.io_threads == 0 || self.worker_threads == 0 {
            return Err(Error::Config(
                "dispatcher pools need at least one thread".into(),
            ));
        }
        Ok(())
    }
}
