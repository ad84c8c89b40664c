//! Networking.
//!
//! Layers, lowest first:
//! - [`socket`]: blocking [`Socket`], [`ServerSocket`] and [`DatagramSocket`]
//! - [`tcp_stream`]: [`SocketStream`], a buffered stream over a socket
//! - [`connection`]: [`Connection`], one session with a peer
//! - [`transport`]: the [`Listener`] / [`Connector`] traits and the [`Tcp`]
//!   and [`Udp`] transports
//! - [`server`] / [`client`]: [`Server`] and [`Client`]
//! - [`env`]: socket library bring-up ([`init`])
//!
//! # Example
//!
//! ```ignore
//! use spindle::net::{Client, Server};
//!
//! let mut server = Server::new()?;
//! server.set_connection_handler(|connection| connection.output().write_str("Hello World"));
//! server.start(0)?;
//!
//! let port = server.port().unwrap();
//! let mut connection = Client::new()?.send("localhost", port)?;
//! let body = connection.input().read_string(64)?;
//! ```

pub mod client;
pub mod connection;
pub mod env;
pub mod server;
pub mod socket;
pub(crate) mod sys;
pub mod tcp_listener;
pub mod tcp_stream;
pub mod transport;
pub mod udp;

pub use client::Client;
pub use connection::Connection;
pub use env::{NetworkGuard, init};
pub use server::{Handler, Server, ServerState};
pub use socket::{DatagramSocket, ServerSocket, Socket};
pub use tcp_stream::{SocketInput, SocketOutput, SocketStream};
pub use transport::{Connector, Listener, Tcp, TcpListener, Transport, Udp, UdpListener};
