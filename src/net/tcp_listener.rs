//! TCP transport.
//!
//! [`TcpListener`] accepts peers on a [`ServerSocket`] and wraps each one in
//! a [`Connection`] backed by a buffered [`SocketStream`](crate::net::SocketStream).
//!
//! # Usage
//!
//! ```ignore
//! use spindle::net::{Listener, Tcp, Transport};
//! use std::time::Duration;
//!
//! let listener = Tcp.bind(8080, &ServerConfig::default())?;
//! listener.listen(128)?;
//! loop {
//!     if let Some(connection) = listener.accept(Duration::from_millis(50))? {
//!         println!("New connection from {}", connection.address());
//!     }
//! }
//! ```

use crate::config::ServerConfig;
use crate::error::Result;
use crate::net::connection::Connection;
use crate::net::socket::{ServerSocket, Socket};
use crate::net::transport::{Connector, Listener, Transport};

use std::net::SocketAddr;
use std::time::Duration;

/// Stream sockets over TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tcp;

/// A TCP listener producing buffered connections.
#[derive(Debug)]
pub struct TcpListener {
    socket: ServerSocket,
    buffer_size: usize,
}

impl TcpListener {
    /// Binds `0.0.0.0:port`; connections get buffers of `buffer_size`.
    pub fn bind(port: u16, buffer_size: usize) -> Result<Self> {
        Ok(Self {
            socket: ServerSocket::bind(port)?,
            buffer_size,
        })
    }
}

impl Listener for TcpListener {
    fn listen(&self, backlog: i32) -> Result<()> {
        self.socket.listen_with_backlog(backlog)
    }

    fn accept(&self, timeout: Duration) -> Result<Option<Connection>> {
        let accepted = self.socket.accept_timeout(timeout)?;
        Ok(accepted.map(|socket| Connection::from_socket(socket, self.buffer_size)))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Connector for Tcp {
    fn connect(&self, host: &str, port: u16, buffer_size: usize) -> Result<Connection> {
        let socket = Socket::connect(host, port)?;
        Ok(Connection::from_socket(socket, buffer_size))
    }
}

impl Transport for Tcp {
    type Listener = TcpListener;

    const NAME: &'static str = "tcp";

    fn bind(&self, port: u16, config: &ServerConfig) -> Result<TcpListener> {
        TcpListener::bind(port, config.buffer_size)
    }
}
