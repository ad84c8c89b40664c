//! Transport-agnostic listening and connecting.
//!
//! A [`Transport`] knows how to bind a [`Listener`] and how to open an
//! outbound [`Connection`] (through [`Connector`]). [`Server`] and
//! [`Client`] are generic over it; [`Tcp`] and [`Udp`] are the two
//! implementations.
//!
//! [`Server`]: crate::net::Server
//! [`Client`]: crate::net::Client

use crate::config::ServerConfig;
use crate::error::Result;
use crate::net::connection::Connection;

use std::net::SocketAddr;
use std::time::Duration;

pub use crate::net::tcp_listener::{Tcp, TcpListener};
pub use crate::net::udp::{Udp, UdpListener};

/// Source of inbound connections.
pub trait Listener: Send + Sync + 'static {
    /// Starts accepting peers.
    fn listen(&self, backlog: i32) -> Result<()>;

    /// Waits at most `timeout` for the next connection. `Ok(None)` on
    /// timeout.
    fn accept(&self, timeout: Duration) -> Result<Option<Connection>>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Opens outbound connections.
pub trait Connector {
    fn connect(&self, host: &str, port: u16, buffer_size: usize) -> Result<Connection>;
}

/// A transport usable by servers and clients.
pub trait Transport: Connector + Clone + Send + Sync + 'static {
    type Listener: Listener;

    /// Short lowercase name used in logs and thread names.
    const NAME: &'static str;

    /// Binds a listener on the IPv4 wildcard address.
    fn bind(&self, port: u16, config: &ServerConfig) -> Result<Self::Listener>;
}
