use crate::error::Result;
use crate::io::{Readable, Writable};
use crate::net::socket::Socket;
use crate::net::tcp_stream::SocketStream;

use std::fmt;

/// One session with a peer: an input stream, an output stream and the
/// peer's address.
///
/// A connection is owned by a single handler at a time. Dropping it closes
/// both streams, which flushes pending output.
pub struct Connection {
    input: Box<dyn Readable + Send>,
    output: Box<dyn Writable + Send>,
    address: String,
}

impl Connection {
    pub fn new(
        input: Box<dyn Readable + Send>,
        output: Box<dyn Writable + Send>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            input,
            output,
            address: address.into(),
        }
    }

    /// Wraps a connected socket in buffered streams.
    pub fn from_socket(socket: Socket, buffer_size: usize) -> Self {
        let address = socket
            .peer_addr()
            .map(|address| address.to_string())
            .unwrap_or_else(|_| String::from("unknown"));
        let (input, output) = SocketStream::new(socket, buffer_size).split();

        Self::new(Box::new(input), Box::new(output), address)
    }

    /// The readable half of the connection.
    ///
    /// # Returns
    /// A borrow of the input stream. Reading from it after [`close`](Self::close)
    /// fails with [`Error::Closed`](crate::Error::Closed).
    ///
    /// # Example
    /// ```ignore
    /// let request = connection.input().read_string(256)?;
    /// ```
    pub fn input(&mut self) -> &mut (dyn Readable + Send) {
        self.input.as_mut()
    }

    /// The writable half of the connection. Writes are buffered until the
    /// buffer fills, [`flush`](Writable::flush) is called, or the connection
    /// closes.
    ///
    /// # Example
    /// ```ignore
    /// connection.output().write_str("HTTP/1.0 200 OK\r\n\r\n")?;
    /// connection.output().flush()?;
    /// ```
    pub fn output(&mut self) -> &mut (dyn Writable + Send) {
        self.output.as_mut()
    }

    /// The peer's address, as reported when the connection was set up.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Flushes and closes the output, then closes the input. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.output.close();
        self.input.close()?;
        flushed
    }

    pub fn is_closed(&self) -> bool {
        self.input.is_closed() && self.output.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::debug!(peer = %self.address, %error, "closing connection failed");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}
