//! Log sinks fed from `tracing`.
//!
//! The crate logs through the `tracing` macros. A [`LogRegistry`] is an
//! explicitly constructed list of [`LogSink`]s; its [`SinkLayer`] forwards
//! every event to them. Nothing is registered behind the caller's back:
//! build the registry at startup, install it, and keep the guard.
//!
//! ```ignore
//! use spindle::logging::LogRegistry;
//!
//! let _logging = LogRegistry::with_console().install("info")?;
//! tracing::info!("ready");  // prints "[INFO] ready" on stderr
//! ```
//!
//! `RUST_LOG` overrides the default filter passed to
//! [`LogRegistry::install`].

use crate::error::{Error, Result};

use std::fmt::{self, Write as _};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// Severity handed to sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&Level> for LogLevel {
    fn from(level: &Level) -> Self {
        if *level == Level::ERROR {
            Self::Error
        } else if *level == Level::WARN {
            Self::Warning
        } else if *level == Level::INFO {
            Self::Info
        } else {
            Self::Debug
        }
    }
}

/// Destination for log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, target: &str, message: &str);

    /// Called when the registry is torn down.
    fn flush(&self) {}
}

/// Writes `[LEVEL] message` lines to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn log(&self, level: LogLevel, _target: &str, message: &str) {
        eprintln!("[{level}] {message}");
    }
}

type Sinks = Arc<RwLock<Vec<Arc<dyn LogSink>>>>;

/// An explicitly managed list of log sinks.
///
/// Clones share the same list.
#[derive(Clone, Default)]
pub struct LogRegistry {
    sinks: Sinks,
}

impl LogRegistry {
    /// A registry with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a [`ConsoleSink`].
    pub fn with_console() -> Self {
        let registry = Self::new();
        registry.add_sink(ConsoleSink);
        registry
    }

    pub fn add_sink<S: LogSink + 'static>(&self, sink: S) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(sink));
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sends one line to every sink directly, bypassing `tracing`.
    ///
    /// This is the only way to emit [`LogLevel::Fatal`].
    pub fn log(&self, level: LogLevel, target: &str, message: &str) {
        for sink in self.sinks.read().unwrap_or_else(PoisonError::into_inner).iter() {
            sink.log(level, target, message);
        }
    }

    /// A `tracing` layer forwarding events to this registry's sinks.
    pub fn layer(&self) -> SinkLayer {
        SinkLayer {
            registry: self.clone(),
        }
    }

    /// Installs this registry as the global `tracing` subscriber.
    ///
    /// Events are filtered by `RUST_LOG` if set, else by `default_filter`
    /// (for example `"info"` or `"spindle=debug"`).
    ///
    /// # Errors
    /// [`Error::Config`] if the filter does not parse or a global subscriber
    /// is already installed.
    pub fn install(&self, default_filter: &str) -> Result<LogGuard> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .map_err(|error| Error::Config(format!("invalid log filter: {error}")))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(self.layer())
            .try_init()
            .map_err(|error| Error::Config(format!("cannot install logging: {error}")))?;

        Ok(LogGuard {
            registry: self.clone(),
        })
    }

    /// Routes events of the current thread to this registry until the
    /// returned guard is dropped. Leaves the global subscriber alone.
    pub fn scoped(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.layer()))
    }

    /// Flushes and removes every sink.
    pub fn teardown(&self) {
        let sinks = std::mem::take(&mut *self.sinks.write().unwrap_or_else(PoisonError::into_inner));
        for sink in sinks {
            sink.flush();
        }
    }
}

impl fmt::Debug for LogRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRegistry")
            .field("sinks", &self.sink_count())
            .finish()
    }
}

/// Tears the registry down when dropped.
#[must_use = "logging is torn down when the guard drops"]
#[derive(Debug)]
pub struct LogGuard {
    registry: LogRegistry,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.registry.teardown();
    }
}

/// `tracing` layer forwarding events to a [`LogRegistry`].
#[derive(Debug, Clone)]
pub struct SinkLayer {
    registry: LogRegistry,
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.registry.log(
            LogLevel::from(metadata.level()),
            metadata.target(),
            &visitor.finish(),
        );
    }
}

// Renders the `message` field followed by the other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
