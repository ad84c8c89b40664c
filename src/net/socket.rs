//! Blocking OS socket wrappers.
//!
//! - [`Socket`]: a connected stream socket
//! - [`ServerSocket`]: a listening stream socket
//! - [`DatagramSocket`]: a UDP socket
//!
//! Each type owns its descriptor and closes it exactly once when dropped.
//! All methods take `&self`, so one socket can be shared between a reader
//! and a writer through an `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use spindle::net::{ServerSocket, Socket};
//!
//! let server = ServerSocket::bind(0)?;
//! server.listen()?;
//! let port = server.local_addr()?.port();
//!
//! let client = Socket::connect("localhost", port)?;
//! let accepted = server.accept()?;
//! client.send(b"ping")?;
//! ```

use crate::config::DEFAULT_BACKLOG;
use crate::error::{Error, Result};
use crate::net::sys::FileDescriptor;

use libc::{SHUT_WR, SO_REUSEADDR, SOCK_DGRAM, SOCK_STREAM, SOL_SOCKET};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addresses: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|error| Error::connection(format!("resolving {host}:{port}"), error))?
        .collect();

    if addresses.is_empty() {
        return Err(Error::connection(
            format!("resolving {host}:{port}"),
            io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        ));
    }

    Ok(addresses)
}

fn wildcard(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

// Tries each address in turn and keeps the last failure for the report.
fn connect_any<F>(
    host: &str,
    port: u16,
    addresses: &[SocketAddr],
    mut open: F,
) -> Result<FileDescriptor>
where
    F: FnMut(&SocketAddr) -> io::Result<FileDescriptor>,
{
    let mut last_error = None;

    for address in addresses {
        match open(address) {
            Ok(fd) => return Ok(fd),
            Err(error) => {
                tracing::debug!(%address, %error, "connect attempt failed");
                last_error = Some(error);
            }
        }
    }

    let error = last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses found"));
    Err(Error::connection(format!("connecting to {host}:{port}"), error))
}

/// A connected stream socket.
#[derive(Debug)]
pub struct Socket {
    fd: FileDescriptor,
}

impl Socket {
    /// Resolves `host` and connects to the first address that accepts.
    ///
    /// Both IPv4 and IPv6 results are tried, in resolver order.
    ///
    /// # Errors
    /// [`Error::Connection`] if resolution fails or no address accepts.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addresses = resolve(host, port)?;
        let fd = connect_any(host, port, &addresses, |address| {
            let fd = FileDescriptor::socket_for(address, SOCK_STREAM)?;
            fd.connect(address)?;
            Ok(fd)
        })?;

        Ok(Self { fd })
    }

    /// Sends bytes, returning how many the OS accepted.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        Ok(self.fd.send(buf)?)
    }

    /// Receives bytes. `Ok(0)` means the peer closed its write side.
    pub fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.fd.recv(buf)?)
    }

    /// Half-closes the socket: the peer sees end of stream, reads still work.
    pub fn shutdown(&self) -> Result<()> {
        Ok(self.fd.shutdown(SHUT_WR)?)
    }

    /// Address of the remote end.
    ///
    /// # Returns
    /// The peer's address, or [`Error::Io`] if the socket is no longer
    /// connected.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.fd.peer_addr()?)
    }

    /// Address this end is bound to, including the port picked by the OS.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.fd.local_addr()?)
    }
}

/// A listening stream socket bound to the IPv4 wildcard address.
#[derive(Debug)]
pub struct ServerSocket {
    fd: FileDescriptor,
}

impl ServerSocket {
    /// Binds `0.0.0.0:port` with `SO_REUSEADDR`. Port `0` picks a free port;
    /// see [`Self::local_addr`].
    ///
    /// # Errors
    /// [`Error::Connection`] if the socket cannot be created or bound.
    pub fn bind(port: u16) -> Result<Self> {
        let address = wildcard(port);
        let context = || format!("binding {address}");

        let fd = FileDescriptor::socket_for(&address, SOCK_STREAM)
            .map_err(|error| Error::connection(context(), error))?;
        fd.set_option(SOL_SOCKET, SO_REUSEADDR, 1)
            .map_err(|error| Error::connection(context(), error))?;
        fd.bind(&address)
            .map_err(|error| Error::connection(context(), error))?;

        Ok(Self { fd })
    }

    /// Starts listening with the default backlog.
    pub fn listen(&self) -> Result<()> {
        self.listen_with_backlog(DEFAULT_BACKLOG)
    }

    /// Starts listening.
    ///
    /// # Arguments
    /// * `backlog` - How many pending connections the OS queues before
    ///   refusing new ones
    pub fn listen_with_backlog(&self, backlog: i32) -> Result<()> {
        self.fd
            .listen(backlog)
            .map_err(|error| Error::connection("listening", error))
    }

    /// Blocks until a peer connects.
    pub fn accept(&self) -> Result<Socket> {
        Ok(Socket {
            fd: self.fd.accept()?,
        })
    }

    /// Waits at most `timeout` for a peer. `Ok(None)` on timeout.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<Socket>> {
        if !self.fd.poll_readable(timeout)? {
            return Ok(None);
        }
        self.accept().map(Some)
    }

    /// Bound address. After `bind(0)` this is where the chosen port is
    /// found.
    ///
    /// # Example
    /// ```ignore
    /// let server = ServerSocket::bind(0)?;
    /// server.listen()?;
    /// let port = server.local_addr()?.port();
    /// ```
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.fd.local_addr()?)
    }
}

/// A UDP socket.
#[derive(Debug)]
pub struct DatagramSocket {
    fd: FileDescriptor,
}

impl DatagramSocket {
    /// Binds `0.0.0.0:port` with `SO_REUSEADDR`.
    pub fn bind(port: u16) -> Result<Self> {
        let address = wildcard(port);
        let context = || format!("binding {address}");

        let fd = FileDescriptor::socket_for(&address, SOCK_DGRAM)
            .map_err(|error| Error::connection(context(), error))?;
        fd.set_option(SOL_SOCKET, SO_REUSEADDR, 1)
            .map_err(|error| Error::connection(context(), error))?;
        fd.bind(&address)
            .map_err(|error| Error::connection(context(), error))?;

        Ok(Self { fd })
    }

    /// Creates a socket whose default peer is `host:port`.
    ///
    /// IPv4 results are tried first: connecting a datagram socket succeeds
    /// whether or not anyone listens, and listeners bind IPv4.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let mut addresses = resolve(host, port)?;
        addresses.sort_by_key(|address| address.is_ipv6());

        let fd = connect_any(host, port, &addresses, |address| {
            let fd = FileDescriptor::socket_for(address, SOCK_DGRAM)?;
            fd.connect(address)?;
            Ok(fd)
        })?;

        Ok(Self { fd })
    }

    /// Sends one datagram to the connected peer.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        Ok(self.fd.send(buf)?)
    }

    /// Receives one datagram from the connected peer.
    pub fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.fd.recv(buf)?)
    }

    /// Sends one datagram to `address`.
    ///
    /// # Arguments
    /// * `buf` - Payload, at most one datagram's worth
    /// * `address` - Destination, usually the sender of a received datagram
    ///
    /// # Returns
    /// The number of bytes the OS accepted.
    pub fn send_to(&self, buf: &[u8], address: &SocketAddr) -> Result<usize> {
        Ok(self.fd.send_to(buf, address)?)
    }

    /// Receives one datagram and the address it came from. Bytes beyond
    /// `buf.len()` are discarded.
    pub fn receive_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.fd.recv_from(buf)?)
    }

    /// Waits at most `timeout` for a datagram. `Ok(None)` on timeout.
    pub fn receive_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<(usize, SocketAddr)>> {
        if !self.fd.poll_readable(timeout)? {
            return Ok(None);
        }
        self.receive_from(buf).map(Some)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.fd.local_addr()?)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.fd.peer_addr()?)
    }
}
