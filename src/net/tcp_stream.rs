//! Buffered stream adapter over a connected [`Socket`].
//!
//! [`SocketStream`] puts the [`Readable`] and [`Writable`] contracts on top
//! of a socket. It is usually [split](SocketStream::split) into a
//! [`SocketInput`] and a [`SocketOutput`] that share the socket.
//!
//! # Buffering
//!
//! - Writes are appended to an output buffer. A full buffer is flushed with
//!   a single `send` of exactly the buffered length; sending fewer bytes is
//!   reported as [`Error::ShortTransfer`].
//! - Reads are served from an input buffer, refilled by one `receive` of at
//!   most the buffer size. A receive of zero bytes, or a reset from the
//!   peer, is end of stream.
//!
//! # Example
//!
//! ```ignore
//! let socket = Socket::connect("localhost", 8080)?;
//! let (mut input, mut output) = SocketStream::new(socket, 256).split();
//! output.write_str("ping")?;
//! output.flush()?;
//! let reply = input.read_string(64)?;
//! ```

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::error::{Error, Result};
use crate::io::{Readable, Stream, Writable, check_range};
use crate::net::socket::Socket;

use std::io;
use std::sync::Arc;

/// The sending side of a connected socket.
pub(crate) trait ByteSink: Send + Sync {
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Half-closes the write direction.
    fn shutdown(&self) -> Result<()>;
}

impl ByteSink for Socket {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        Socket::send(self, buf)
    }

    fn shutdown(&self) -> Result<()> {
        Socket::shutdown(self)
    }
}

/// A socket with buffered reads and writes.
pub struct SocketStream {
    input: SocketInput,
    output: SocketOutput,
}

impl SocketStream {
    /// Wraps `socket` with input and output buffers of `buffer_size` bytes
    /// each (at least one byte).
    pub fn new(socket: Socket, buffer_size: usize) -> Self {
        let socket = Arc::new(socket);
        let buffer_size = buffer_size.max(1);

        Self {
            input: SocketInput {
                socket: socket.clone(),
                buffer: vec![0; buffer_size],
                position: 0,
                filled: 0,
                closed: false,
            },
            output: SocketOutput::new(socket, buffer_size),
        }
    }

    /// Wraps `socket` with the default buffer size.
    pub fn with_default_buffer(socket: Socket) -> Self {
        Self::new(socket, DEFAULT_BUFFER_SIZE)
    }

    /// Separates the read and write halves.
    pub fn split(self) -> (SocketInput, SocketOutput) {
        (self.input, self.output)
    }
}

impl Stream for SocketStream {
    fn close(&mut self) -> Result<()> {
        let flushed = self.output.close();
        self.input.close()?;
        flushed
    }

    fn is_closed(&self) -> bool {
        self.input.closed && self.output.closed
    }
}

impl Readable for SocketStream {
    fn read(&mut self, buf: &mut [u8], offset: usize, size: usize) -> Result<usize> {
        self.input.read(buf, offset, size)
    }
}

impl Writable for SocketStream {
    fn write(&mut self, buf: &[u8], offset: usize, size: usize) -> Result<()> {
        self.output.write(buf, offset, size)
    }

    fn flush(&mut self) -> Result<()> {
        self.output.flush()
    }
}

/// Read half of a [`SocketStream`].
pub struct SocketInput {
    socket: Arc<Socket>,
    buffer: Vec<u8>,
    position: usize,
    filled: usize,
    closed: bool,
}

impl SocketInput {
    fn refill(&mut self) -> Result<usize> {
        let received = match self.socket.receive(&mut self.buffer) {
            Ok(n) => n,
            Err(Error::Io(error)) if error.kind() == io::ErrorKind::ConnectionReset => 0,
            Err(error) => return Err(error),
        };

        self.position = 0;
        self.filled = received;
        Ok(received)
    }
}

impl Stream for SocketInput {
    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Readable for SocketInput {
    fn read(&mut self, buf: &mut [u8], offset: usize, size: usize) -> Result<usize> {
        check_range(buf.len(), offset, size)?;
        if self.closed {
            return Err(Error::Closed);
        }
        if size == 0 {
            return Ok(0);
        }

        if self.position == self.filled && self.refill()? == 0 {
            return Ok(0);
        }

        let n = size.min(self.filled - self.position);
        buf[offset..offset + n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;

        Ok(n)
    }
}

/// Write half of a [`SocketStream`].
///
/// Dropping it closes it: buffered data is flushed and the write side of
/// the socket is shut down.
pub struct SocketOutput {
    socket: Arc<dyn ByteSink>,
    buffer: Vec<u8>,
    capacity: usize,
    closed: bool,
}

impl SocketOutput {
    fn new(socket: Arc<dyn ByteSink>, capacity: usize) -> Self {
        Self {
            socket,
            buffer: Vec::with_capacity(capacity),
            capacity,
            closed: false,
        }
    }

    fn send_buffered(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let expected = self.buffer.len();
        let actual = self.socket.send(&self.buffer)?;
        self.buffer.clear();

        if actual != expected {
            return Err(Error::ShortTransfer { expected, actual });
        }
        Ok(())
    }
}

impl Stream for SocketOutput {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let flushed = self.send_buffered();
        let shut = match self.socket.shutdown() {
            // The peer may already be gone.
            Err(Error::Io(error)) if error.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        };

        flushed.and(shut)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Writable for SocketOutput {
    fn write(&mut self, buf: &[u8], offset: usize, size: usize) -> Result<()> {
        check_range(buf.len(), offset, size)?;
        if self.closed {
            return Err(Error::Closed);
        }

        let mut pending = &buf[offset..offset + size];
        while !pending.is_empty() {
            let room = self.capacity - self.buffer.len();
            let (chunk, rest) = pending.split_at(room.min(pending.len()));
            self.buffer.extend_from_slice(chunk);
            pending = rest;

            if self.buffer.len() == self.capacity {
                self.send_buffered()?;
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.send_buffered()
    }
}

impl Drop for SocketOutput {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::debug!(%error, "closing socket output failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Accepts at most `limit` bytes per send.
    struct Truncating {
        limit: usize,
        sent: Mutex<Vec<usize>>,
    }

    impl ByteSink for Truncating {
        fn send(&self, buf: &[u8]) -> Result<usize> {
            let accepted = buf.len().min(self.limit);
            self.sent.lock().expect("sent lock").push(buf.len());
            Ok(accepted)
        }

        fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    fn truncating(limit: usize) -> Arc<Truncating> {
        Arc::new(Truncating {
            limit,
            sent: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn full_buffer_short_send() {
        let sink = truncating(3);
        let mut output = SocketOutput::new(sink.clone(), 4);

        let result = output.write(b"abcdef", 0, 6);

        assert!(matches!(
            result,
            Err(Error::ShortTransfer {
                expected: 4,
                actual: 3
            })
        ));
        assert_eq!(*sink.sent.lock().expect("sent lock"), vec![4]);
    }

    #[test]
    fn flush_short_send() {
        let sink = truncating(1);
        let mut output = SocketOutput::new(sink.clone(), 16);
        output.write_str("hey").expect("buffered write");

        assert!(matches!(
            output.flush(),
            Err(Error::ShortTransfer {
                expected: 3,
                actual: 1
            })
        ));
        // The failed chunk is dropped rather than sent twice.
        output.flush().expect("nothing left to send");
        assert_eq!(*sink.sent.lock().expect("sent lock"), vec![3]);
    }

    #[test]
    fn close_reports_short_send() {
        let sink = truncating(2);
        let mut output = SocketOutput::new(sink, 8);
        output.write_str("bytes").expect("buffered write");

        assert!(matches!(
            output.close(),
            Err(Error::ShortTransfer {
                expected: 5,
                actual: 2
            })
        ));
        assert!(output.is_closed());
    }
}
