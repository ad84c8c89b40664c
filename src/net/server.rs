//! Executor-driven connection server.
//!
//! [`Server::start`] binds and listens, then submits one long-running accept
//! loop to the server's executor. Every accepted connection is submitted as
//! its own job, so a slow handler never blocks the accept loop.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──► Bound ──► Listening ──► Accepting ──► Stopped
//! ```
//!
//! [`Server::shutdown`] can be called from any state. The accept loop
//! notices the stop flag within one accept poll interval; connections
//! already dispatched are handled to completion before the executor stops.
//!
//! # Example
//!
//! ```ignore
//! use spindle::net::Server;
//!
//! let mut server = Server::new()?;
//! server.set_connection_handler(|connection| {
//!     connection.output().write_str("Hello World")
//! });
//! server.start(8080)?;
//! ```

use crate::builder::ServerBuilder;
use crate::config::ServerConfig;
use crate::error::{Error, Result, TaskError};
use crate::net::connection::Connection;
use crate::net::env::{self, NetworkGuard};
use crate::net::transport::{Listener, Tcp, Transport};
use crate::runtime::{Executor, FixedThreadPoolExecutor, lock};

use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Callback run once per connection, on an executor worker.
pub type Handler = Arc<dyn Fn(&mut Connection) -> Result<()> + Send + Sync>;

/// Where a server is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerState {
    Created,
    Bound,
    Listening,
    Accepting,
    Stopped,
}

struct Shared {
    stop: AtomicBool,
    state: Mutex<ServerState>,
}

/// A server accepting connections over transport `T`.
pub struct Server<T: Transport = Tcp> {
    transport: T,
    config: ServerConfig,
    executor: Arc<dyn Executor>,
    handler: Handler,
    shared: Arc<Shared>,
    local_addr: Option<SocketAddr>,
    _network: NetworkGuard,
}

impl Server<Tcp> {
    /// A TCP server with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(Tcp, ServerConfig::default())
    }

    pub fn builder() -> ServerBuilder<Tcp> {
        ServerBuilder::tcp()
    }
}

impl<T: Transport> Server<T> {
    /// A server running on its own fixed pool of `config.worker_threads`.
    pub fn with_config(transport: T, config: ServerConfig) -> Result<Self> {
        let config = config.validate()?;
        let executor = FixedThreadPoolExecutor::named(
            &format!("spindle-{}", T::NAME),
            config.worker_threads,
        )?;

        Self::with_executor(transport, config, Arc::new(executor))
    }

    /// A server running on a caller-supplied executor.
    ///
    /// The accept loop occupies one worker for as long as the server runs,
    /// so the executor needs at least two. The server shuts the executor
    /// down when it stops.
    pub fn with_executor(
        transport: T,
        config: ServerConfig,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        // The pool size only matters for the executor we would have created.
        let config = ServerConfig {
            worker_threads: config.worker_threads.max(2),
            ..config
        }
        .validate()?;
        check_executor(executor.as_ref())?;

        Ok(Self {
            transport,
            config,
            executor,
            handler: Arc::new(|_connection: &mut Connection| Ok(())),
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                state: Mutex::new(ServerState::Created),
            }),
            local_addr: None,
            _network: env::init()?,
        })
    }

    /// Registers the callback run for every connection. Takes effect for
    /// servers started afterwards.
    pub fn set_connection_handler<F>(&mut self, handler: F)
    where
        F: Fn(&mut Connection) -> Result<()> + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
    }

    pub(crate) fn set_handler(&mut self, handler: Handler) {
        self.handler = handler;
    }

    /// Replaces the executor before the server starts.
    ///
    /// # Errors
    /// - [`Error::AlreadyStarted`] once [`Self::start`] has been called
    /// - [`Error::Config`] if the executor has fewer than two workers
    /// - [`Error::Rejected`] if the executor has been shut down
    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) -> Result<()> {
        if self.state() != ServerState::Created {
            return Err(Error::AlreadyStarted);
        }
        check_executor(executor.as_ref())?;

        self.executor = executor;
        Ok(())
    }

    /// Binds `port` (`0` picks a free one), listens and starts accepting.
    ///
    /// # Errors
    /// - [`Error::AlreadyStarted`] if the server was started or stopped
    /// - [`Error::Connection`] if binding or listening fails
    /// - [`Error::Rejected`] if the executor has been shut down; the server
    ///   is back in `Created` and can be given another executor
    pub fn start(&mut self, port: u16) -> Result<()> {
        if self.state() != ServerState::Created {
            return Err(Error::AlreadyStarted);
        }

        let listener = self.transport.bind(port, &self.config)?;
        self.set_state(ServerState::Bound);

        let listening = listener
            .listen(self.config.backlog)
            .and_then(|()| listener.local_addr());
        let local_addr = match listening {
            Ok(address) => address,
            Err(error) => {
                self.set_state(ServerState::Created);
                return Err(error);
            }
        };
        self.local_addr = Some(local_addr);
        self.set_state(ServerState::Listening);

        let accept_loop = AcceptLoop {
            listener,
            executor: self.executor.clone(),
            handler: self.handler.clone(),
            shared: self.shared.clone(),
            poll_interval: self.config.accept_poll_interval,
        };
        if let Err(error) = self.executor.submit(Box::new(move || accept_loop.run())) {
            // The rejected job took the listener with it.
            self.local_addr = None;
            self.set_state(ServerState::Created);
            return Err(error);
        }
        self.set_state(ServerState::Accepting);

        tracing::info!(transport = T::NAME, address = %local_addr, "server started");
        Ok(())
    }

    /// Stops accepting, waits for in-flight handlers and shuts the executor
    /// down. Idempotent; also run on drop.
    pub fn shutdown(&self) {
        if self.shared.stop.swap(true, Ordering::AcqRel) {
            return;
        }

        self.set_state(ServerState::Stopped);
        self.executor.shutdown();

        tracing::info!(transport = T::NAME, "server stopped");
    }

    /// Address the server listens on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Port the server listens on, once started.
    pub fn port(&self) -> Option<u16> {
        self.local_addr.map(|address| address.port())
    }

    pub fn state(&self) -> ServerState {
        *lock(&self.shared.state)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    fn set_state(&self, state: ServerState) {
        *lock(&self.shared.state) = state;
    }
}

impl<T: Transport> Drop for Server<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Transport> fmt::Debug for Server<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("transport", &T::NAME)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

fn check_executor(executor: &dyn Executor) -> Result<()> {
    if executor.is_shutdown() {
        return Err(Error::Rejected);
    }
    if executor.worker_count() < 2 {
        return Err(Error::Config(format!(
            "a server executor needs at least 2 workers (accept loop + handlers), got {}",
            executor.worker_count()
        )));
    }
    Ok(())
}

struct AcceptLoop<L> {
    listener: L,
    executor: Arc<dyn Executor>,
    handler: Handler,
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl<L: Listener> AcceptLoop<L> {
    fn run(self) {
        tracing::debug!("accept loop running");
        let mut failures: u32 = 0;

        while !self.shared.stop.load(Ordering::Acquire) {
            match self.listener.accept(self.poll_interval) {
                Ok(Some(connection)) => {
                    failures = 0;
                    self.dispatch(connection);
                }
                Ok(None) => {}
                Err(error) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(%error, failures, "accept failed");
                    thread::sleep(self.poll_interval.min(Duration::from_millis(
                        10 * u64::from(failures.min(10)),
                    )));
                }
            }
        }

        tracing::debug!("accept loop stopped");
    }

    fn dispatch(&self, connection: Connection) {
        tracing::debug!(peer = connection.address(), "connection accepted");

        let handler = self.handler.clone();
        let job = Box::new(move || handle_connection(handler.as_ref(), connection));

        // A rejected job is dropped, which closes its connection.
        if let Err(error) = self.executor.submit(job) {
            tracing::warn!(%error, "connection dropped");
        }
    }
}

fn handle_connection(
    handler: &(dyn Fn(&mut Connection) -> Result<()> + Send + Sync),
    mut connection: Connection,
) {
    let span = tracing::debug_span!("connection", peer = connection.address());
    let _entered = span.enter();

    match panic::catch_unwind(AssertUnwindSafe(|| handler(&mut connection))) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::error!(%error, "connection handler failed"),
        Err(payload) => tracing::error!(
            error = %TaskError::from_panic(payload),
            "connection handler panicked"
        ),
    }

    if let Err(error) = connection.close() {
        tracing::debug!(%error, "closing connection failed");
    }
}
