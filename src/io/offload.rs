//! Async stream capabilities.
//!
//! [`AsyncReadable`] and [`AsyncWritable`] mirror the sync traits but return
//! boxed futures. [`Offloaded`] adapts any sync stream by running each
//! operation on an executor worker, so awaiting it never blocks the caller's
//! thread.
//!
//! ```ignore
//! let pool = Executors::new_fixed_thread_pool(2)?;
//! let mut stream = Offloaded::new(MemoryStream::from_bytes("ping"), pool);
//! let text = block_on(stream.read_string(4))?;
//! ```

use crate::error::{Error, Result};
use crate::io::{Readable, Stream, Writable, check_range};
use crate::runtime::{Executor, ExecutorExt, JoinHandle, lock};

use futures::future::BoxFuture;
use std::io;
use std::sync::{Arc, Mutex};

/// Future returned by the async stream traits.
pub type IoFuture<'a, T> = BoxFuture<'a, Result<T>>;

/// Async counterpart of [`Stream`].
pub trait AsyncStream: Send {
    fn close(&mut self) -> IoFuture<'_, ()>;

    fn is_closed(&self) -> bool;
}

/// Async counterpart of [`Readable`].
pub trait AsyncReadable: AsyncStream {
    fn read<'a>(&'a mut self, buf: &'a mut [u8], offset: usize, size: usize)
    -> IoFuture<'a, usize>;

    fn read_string(&mut self, size: usize) -> IoFuture<'_, String> {
        Box::pin(async move {
            let mut buf = vec![0; size];
            let n = self.read(&mut buf, 0, size).await?;
            buf.truncate(n);

            String::from_utf8(buf)
                .map_err(|error| Error::Io(io::Error::new(io::ErrorKind::InvalidData, error)))
        })
    }
}

/// Async counterpart of [`Writable`].
pub trait AsyncWritable: AsyncStream {
    fn write<'a>(&'a mut self, buf: &'a [u8], offset: usize, size: usize) -> IoFuture<'a, ()>;

    fn flush(&mut self) -> IoFuture<'_, ()>;

    fn write_str<'a>(&'a mut self, s: &'a str) -> IoFuture<'a, ()> {
        self.write(s.as_bytes(), 0, s.len())
    }
}

/// A sync stream whose operations run on an executor.
///
/// Buffers are copied to and from the worker, so the caller's buffer is
/// only touched once the operation has completed.
pub struct Offloaded<S> {
    stream: Arc<Mutex<S>>,
    executor: Arc<dyn Executor>,
    closed: bool,
}

impl<S: Stream + Send + 'static> Offloaded<S> {
    pub fn new(stream: S, executor: Arc<dyn Executor>) -> Self {
        Self {
            stream: Arc::new(Mutex::new(stream)),
            executor,
            closed: false,
        }
    }

    /// Returns the wrapped stream, or `None` while an operation on it is
    /// still in flight.
    pub fn into_inner(self) -> Option<S> {
        Arc::try_unwrap(self.stream)
            .ok()
            .map(|stream| stream.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    fn offload<F, T>(&self, op: F) -> JoinHandle<Result<T>>
    where
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let stream = self.stream.clone();
        self.executor.execute(move || op(&mut lock(&stream)))
    }
}

impl<S: Stream + Send + 'static> AsyncStream for Offloaded<S> {
    fn close(&mut self) -> IoFuture<'_, ()> {
        let pending = self.offload(|stream| stream.close());
        Box::pin(async move {
            pending.await??;
            self.closed = true;
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: Readable + Send + 'static> AsyncReadable for Offloaded<S> {
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        offset: usize,
        size: usize,
    ) -> IoFuture<'a, usize> {
        Box::pin(async move {
            check_range(buf.len(), offset, size)?;

            let data = self
                .offload(move |stream| {
                    let mut scratch = vec![0; size];
                    let n = stream.read(&mut scratch, 0, size)?;
                    scratch.truncate(n);
                    Ok(scratch)
                })
                .await??;

            buf[offset..offset + data.len()].copy_from_slice(&data);
            Ok(data.len())
        })
    }
}

impl<S: Writable + Send + 'static> AsyncWritable for Offloaded<S> {
    fn write<'a>(&'a mut self, buf: &'a [u8], offset: usize, size: usize) -> IoFuture<'a, ()> {
        Box::pin(async move {
            check_range(buf.len(), offset, size)?;

            let data = buf[offset..offset + size].to_vec();
            self.offload(move |stream| stream.write(&data, 0, data.len()))
                .await?
        })
    }

    fn flush(&mut self) -> IoFuture<'_, ()> {
        let pending = self.offload(|stream| stream.flush());
        Box::pin(async move { pending.await? })
    }
}
