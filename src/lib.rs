//! Thread-pool async runtime with a blocking socket stream layer.
//!
//! The crate provides single-shot tasks, lazy generators and pluggable
//! executors, plus the socket, stream and server plumbing needed to run a
//! concurrent connection server on top of them.
//!
//! # Architecture
//!
//! - **Executor**: worker threads draining a shared job queue ([`runtime`])
//! - **Dispatcher**: named Io / Main / Worker roles over executors
//! - **Task**: single-shot computation with continuation chaining ([`Task`])
//! - **Generator**: lazy pull-based sequence ([`Generator`])
//! - **Streams**: `Readable` / `Writable` capabilities ([`io`])
//! - **Networking**: sockets, buffered socket streams, `Server` and `Client`
//!   over TCP or UDP ([`net`])
//! - **ServerBuilder**: fluent configuration of servers ([`ServerBuilder`])
//! - **Logging**: sinks fed from `tracing` ([`logging`])

mod builder;
pub mod config;
mod error;
mod generator;
pub mod io;
pub mod logging;
pub mod net;
pub mod runtime;
mod task;

pub use builder::ServerBuilder;
pub use config::{DispatcherConfig, ServerConfig};
pub use error::{Error, Result, TaskError};
pub use generator::{Co, Generator, RangeValue, Yield};
pub use io::{Duplex, MemoryStream, Readable, Stream, Writable};
pub use net::{Client, Connection, Server};
pub use runtime::{
    Dispatcher, DispatcherKind, Dispatchers, Executor, ExecutorExt, ExecutorKind, Executors,
    FixedThreadPoolExecutor, JoinHandle, SingleThreadExecutor, block_on,
};
pub use task::{Task, TaskFuture, TaskStatus};
