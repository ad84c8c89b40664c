//! UDP transport.
//!
//! UDP has no sessions, so the listener makes one up per datagram: each
//! received datagram becomes a [`Connection`] whose input holds the payload
//! and whose output sends one reply datagram back to the sender every time
//! it is flushed (closing flushes).
//!
//! Outbound connections use a connected [`DatagramSocket`]: every read
//! consumes datagrams from the peer, every flush sends one.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::io::{MemoryStream, Readable, Stream, Writable, check_range};
use crate::net::connection::Connection;
use crate::net::socket::DatagramSocket;
use crate::net::transport::{Connector, Listener, Transport};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Largest payload of an IPv4 UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Datagram sockets over UDP.
#[derive(Clone, Copy, Debug, Default)]
pub struct Udp;

/// Turns incoming datagrams into connections.
#[derive(Debug)]
pub struct UdpListener {
    socket: Arc<DatagramSocket>,
}

impl UdpListener {
    /// Binds `0.0.0.0:port`.
    pub fn bind(port: u16) -> Result<Self> {
        Ok(Self {
            socket: Arc::new(DatagramSocket::bind(port)?),
        })
    }
}

impl Listener for UdpListener {
    fn listen(&self, _backlog: i32) -> Result<()> {
        Ok(())
    }

    fn accept(&self, timeout: Duration) -> Result<Option<Connection>> {
        let mut payload = vec![0; MAX_DATAGRAM_SIZE];
        let Some((n, peer)) = self.socket.receive_timeout(&mut payload, timeout)? else {
            return Ok(None);
        };
        payload.truncate(n);

        let input = MemoryStream::from_bytes(payload);
        let output = DatagramWriter::new(self.socket.clone(), Some(peer));

        Ok(Some(Connection::new(
            Box::new(input),
            Box::new(output),
            peer.to_string(),
        )))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Connector for Udp {
    fn connect(&self, host: &str, port: u16, _buffer_size: usize) -> Result<Connection> {
        let socket = Arc::new(DatagramSocket::connect(host, port)?);
        let address = socket
            .peer_addr()
            .map(|address| address.to_string())
            .unwrap_or_else(|_| format!("{host}:{port}"));

        let input = DatagramReader::new(socket.clone());
        let output = DatagramWriter::new(socket, None);

        Ok(Connection::new(Box::new(input), Box::new(output), address))
    }
}

impl Transport for Udp {
    type Listener = UdpListener;

    const NAME: &'static str = "udp";

    fn bind(&self, port: u16, _config: &ServerConfig) -> Result<UdpListener> {
        UdpListener::bind(port)
    }
}

/// Reads the datagrams of a connected socket as one byte stream.
struct DatagramReader {
    socket: Arc<DatagramSocket>,
    datagram: Vec<u8>,
    position: usize,
    closed: bool,
}

impl DatagramReader {
    fn new(socket: Arc<DatagramSocket>) -> Self {
        Self {
            socket,
            datagram: Vec::new(),
            position: 0,
            closed: false,
        }
    }
}

impl Stream for DatagramReader {
    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Readable for DatagramReader {
    fn read(&mut self, buf: &mut [u8], offset: usize, size: usize) -> Result<usize> {
        check_range(buf.len(), offset, size)?;
        if self.closed {
            return Err(Error::Closed);
        }
        if size == 0 {
            return Ok(0);
        }

        if self.position == self.datagram.len() {
            self.datagram.resize(MAX_DATAGRAM_SIZE, 0);
            let n = self.socket.receive(&mut self.datagram)?;
            self.datagram.truncate(n);
            self.position = 0;
            if n == 0 {
                return Ok(0);
            }
        }

        let n = size.min(self.datagram.len() - self.position);
        buf[offset..offset + n].copy_from_slice(&self.datagram[self.position..self.position + n]);
        self.position += n;

        Ok(n)
    }
}

/// Where a [`DatagramWriter`] hands its datagrams.
trait DatagramSink: Send + Sync {
    /// Sends to the connected peer.
    fn send(&self, buf: &[u8]) -> Result<usize>;

    fn send_to(&self, buf: &[u8], address: &SocketAddr) -> Result<usize>;
}

impl DatagramSink for DatagramSocket {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        DatagramSocket::send(self, buf)
    }

    fn send_to(&self, buf: &[u8], address: &SocketAddr) -> Result<usize> {
        DatagramSocket::send_to(self, buf, address)
    }
}

/// Buffers writes and sends them as one datagram per flush, either to the
/// connected peer or to a fixed `peer`.
struct DatagramWriter {
    socket: Arc<dyn DatagramSink>,
    peer: Option<SocketAddr>,
    buffer: Vec<u8>,
    closed: bool,
}

impl DatagramWriter {
    fn new(socket: Arc<dyn DatagramSink>, peer: Option<SocketAddr>) -> Self {
        Self {
            socket,
            peer,
            buffer: Vec::new(),
            closed: false,
        }
    }

    fn send_buffered(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let expected = self.buffer.len();
        let actual = match &self.peer {
            Some(peer) => self.socket.send_to(&self.buffer, peer)?,
            None => self.socket.send(&self.buffer)?,
        };
        self.buffer.clear();

        if actual != expected {
            return Err(Error::ShortTransfer { expected, actual });
        }
        Ok(())
    }
}

impl Stream for DatagramWriter {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send_buffered()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Writable for DatagramWriter {
    fn write(&mut self, buf: &[u8], offset: usize, size: usize) -> Result<()> {
        check_range(buf.len(), offset, size)?;
        if self.closed {
            return Err(Error::Closed);
        }
        if self.buffer.len() + size > MAX_DATAGRAM_SIZE {
            self.send_buffered()?;
        }

        self.buffer.extend_from_slice(&buf[offset..offset + size]);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.send_buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records each datagram and accepts at most `limit` bytes of it.
    struct Truncating {
        limit: usize,
        sent: Mutex<Vec<(usize, Option<SocketAddr>)>>,
    }

    impl Truncating {
        fn new(limit: usize) -> Arc<Self> {
            Arc::new(Self {
                limit,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, len: usize, peer: Option<SocketAddr>) -> usize {
            self.sent.lock().expect("sent lock").push((len, peer));
            len.min(self.limit)
        }
    }

    impl DatagramSink for Truncating {
        fn send(&self, buf: &[u8]) -> Result<usize> {
            Ok(self.record(buf.len(), None))
        }

        fn send_to(&self, buf: &[u8], address: &SocketAddr) -> Result<usize> {
            Ok(self.record(buf.len(), Some(*address)))
        }
    }

    #[test]
    fn connected_short_send() {
        let sink = Truncating::new(2);
        let mut writer = DatagramWriter::new(sink.clone(), None);
        writer.write_str("ping").expect("buffered write");

        assert!(matches!(
            writer.flush(),
            Err(Error::ShortTransfer {
                expected: 4,
                actual: 2
            })
        ));
        assert_eq!(*sink.sent.lock().expect("sent lock"), vec![(4, None)]);
    }

    #[test]
    fn reply_short_send() {
        let peer: SocketAddr = "127.0.0.1:4000".parse().expect("address");
        let sink = Truncating::new(0);
        let mut writer = DatagramWriter::new(sink.clone(), Some(peer));
        writer.write_str("pong").expect("buffered write");

        assert!(matches!(
            writer.close(),
            Err(Error::ShortTransfer {
                expected: 4,
                actual: 0
            })
        ));
        assert!(writer.is_closed());
        assert_eq!(*sink.sent.lock().expect("sent lock"), vec![(4, Some(peer))]);
    }

    #[test]
    fn oversized_write_sends_pending_datagram_first() {
        let sink = Truncating::new(1);
        let mut writer = DatagramWriter::new(sink.clone(), None);
        writer.write_str("ab").expect("buffered write");

        let large = vec![0u8; MAX_DATAGRAM_SIZE];
        assert!(matches!(
            writer.write(&large, 0, large.len()),
            Err(Error::ShortTransfer {
                expected: 2,
                actual: 1
            })
        ));
    }
}
