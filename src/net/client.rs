use crate::config::DEFAULT_BUFFER_SIZE;
use crate::error::Result;
use crate::net::connection::Connection;
use crate::net::env::{self, NetworkGuard};
use crate::net::transport::{Tcp, Transport};
use crate::runtime::{Dispatchers, Executor, ExecutorExt, JoinHandle};

/// Opens outbound connections over transport `T`.
///
/// A client keeps no state between calls; every call opens its own socket.
///
/// # Example
/// ```ignore
/// let client = Client::new()?;
/// let mut connection = client.send("localhost", 8080)?;
/// connection.output().write_str("ping")?;
/// connection.output().flush()?;
/// ```
pub struct Client<T: Transport = Tcp> {
    transport: T,
    buffer_size: usize,
    _network: NetworkGuard,
}

impl Client<Tcp> {
    pub fn new() -> Result<Self> {
        Self::with_transport(Tcp)
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(transport: T) -> Result<Self> {
        Ok(Self {
            transport,
            buffer_size: DEFAULT_BUFFER_SIZE,
            _network: env::init()?,
        })
    }

    /// Sets the buffer size of the connections opened from now on.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Connects to `host:port` on the calling thread.
    ///
    /// # Arguments
    /// * `host` - Host name or IP literal, resolved on every call
    /// * `port` - Remote port
    ///
    /// # Returns
    /// An open [`Connection`], or [`Error::Connection`](crate::Error::Connection)
    /// if no resolved address accepts.
    ///
    /// # Example
    /// ```ignore
    /// let client = Client::new()?;
    /// let mut connection = client.send("localhost", 8080)?;
    /// connection.output().write_str("ping")?;
    /// connection.close()?;
    /// ```
    pub fn send(&self, host: &str, port: u16) -> Result<Connection> {
        self.transport.connect(host, port, self.buffer_size)
    }

    /// Connects and runs `handler` on the global IO dispatcher.
    ///
    /// The handle resolves to the handler's result, or to the connect
    /// error. The connection is closed once the handler returns.
    pub fn send_async<F>(
        &self,
        host: &str,
        port: u16,
        handler: F,
    ) -> Result<JoinHandle<Result<()>>>
    where
        F: FnOnce(&mut Connection) -> Result<()> + Send + 'static,
    {
        let dispatchers = Dispatchers::global()?;
        Ok(self.send_async_with(host, port, handler, dispatchers.io().executor().as_ref()))
    }

    /// Like [`Self::send_async`], on a caller-chosen executor.
    pub fn send_async_with<F, E>(
        &self,
        host: &str,
        port: u16,
        handler: F,
        executor: &E,
    ) -> JoinHandle<Result<()>>
    where
        F: FnOnce(&mut Connection) -> Result<()> + Send + 'static,
        E: Executor + ?Sized,
    {
        let transport = self.transport.clone();
        let host = host.to_string();
        let buffer_size = self.buffer_size;

        executor.execute(move || {
            let mut connection = transport.connect(&host, port, buffer_size)?;
            let outcome = handler(&mut connection);
            let closed = connection.close();
            outcome.and(closed)
        })
    }
}
