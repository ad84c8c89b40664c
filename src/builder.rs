//! Fluent builder for Server construction.
//!
//! Provides a builder pattern interface for creating and configuring servers
//! over any transport.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::net::transport::{Tcp, Transport, Udp};
use crate::net::{Connection, Handler, Server};
use crate::runtime::Executor;

use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing [`Server`] instances with a fluent API.
///
/// # Example
/// ```ignore
/// let server = ServerBuilder::tcp()
///     .worker_threads(4)
///     .buffer_size(1024)
///     .handler(|conn| conn.output().write_str("Hello World"))
///     .build()?;
/// ```
pub struct ServerBuilder<T: Transport = Tcp> {
    transport: T,
    config: ServerConfig,
    executor: Option<Arc<dyn Executor>>,
    handler: Option<Handler>,
}

impl ServerBuilder<Tcp> {
    /// Creates a builder for a TCP server.
    pub fn tcp() -> Self {
        Self::new(Tcp)
    }
}

impl ServerBuilder<Udp> {
    /// Creates a builder for a UDP server.
    pub fn udp() -> Self {
        Self::new(Udp)
    }
}

impl Default for ServerBuilder<Tcp> {
    fn default() -> Self {
        Self::tcp()
    }
}

impl<T: Transport> ServerBuilder<T> {
    /// Creates a builder for a server over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: ServerConfig::default(),
            executor: None,
            handler: None,
        }
    }

    /// Sets the size of the default executor's pool.
    ///
    /// Ignored when an executor is supplied through [`Self::executor`].
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Sets the size of each connection buffer.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Sets the listen backlog.
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// Sets how often the accept loop re-checks the stop flag.
    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.config.accept_poll_interval = interval;
        self
    }

    /// Runs the accept loop and the handlers on this executor.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Registers the connection handler.
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Connection) -> Result<()> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the server.
    ///
    /// # Errors
    /// [`Error::Config`](crate::Error::Config) if a value is out of range,
    /// or if a supplied executor has fewer than two workers.
    pub fn build(self) -> Result<Server<T>> {
        let mut server = match self.executor {
            Some(executor) => Server::with_executor(self.transport, self.config, executor)?,
            None => Server::with_config(self.transport, self.config)?,
        };

        if let Some(handler) = self.handler {
            server.set_handler(handler);
        }

        Ok(server)
    }
}
