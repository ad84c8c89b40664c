//! Byte-oriented stream capabilities.
//!
//! Streams are described by small capability traits instead of a class
//! hierarchy:
//!
//! - [`Stream`]: can be closed
//! - [`Readable`]: `read(buf, offset, size)`, where `Ok(0)` means end of stream
//! - [`Writable`]: `write(buf, offset, size)`, which consumes the whole range
//!   or fails
//! - [`Duplex`]: both, implemented automatically
//!
//! The convenience methods (`read_into`, `read_string`, `write_all`,
//! `write_str`, ..) are provided on top of the range-based primitives and
//! always go through them.
//!
//! Async counterparts live in [`offload`]; [`MemoryStream`] is an in-memory
//! duplex stream.

pub mod memory;
pub mod offload;

pub use memory::MemoryStream;
pub use offload::{AsyncReadable, AsyncStream, AsyncWritable, IoFuture, Offloaded};

use crate::error::{Error, Result};

use std::io;

/// Anything that can be closed.
pub trait Stream {
    /// Closes the stream. Closing twice is a no-op. Writable streams flush
    /// buffered data first.
    fn close(&mut self) -> Result<()>;

    /// Returns `true` once the stream has been closed.
    fn is_closed(&self) -> bool;
}

/// A stream bytes can be read from.
pub trait Readable: Stream {
    /// Reads up to `size` bytes into `buf[offset..offset + size]`.
    ///
    /// Returns the number of bytes read; `Ok(0)` for a non-empty range means
    /// end of stream.
    ///
    /// # Errors
    /// - [`Error::Closed`] if the stream was closed
    /// - [`Error::Io`] with `InvalidInput` if the range does not fit `buf`
    fn read(&mut self, buf: &mut [u8], offset: usize, size: usize) -> Result<usize>;

    /// Reads into the whole of `buf`.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let size = buf.len();
        self.read(buf, 0, size)
    }

    /// Reads at most `size` bytes in one read and decodes them as UTF-8.
    fn read_string(&mut self, size: usize) -> Result<String> {
        let mut buf = vec![0; size];
        let n = self.read(&mut buf, 0, size)?;
        buf.truncate(n);

        String::from_utf8(buf)
            .map_err(|error| Error::Io(io::Error::new(io::ErrorKind::InvalidData, error)))
    }

    /// Reads until end of stream, appending to `out`. Returns the number of
    /// bytes appended.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = [0u8; 512];
        let len = chunk.len();
        let mut total = 0;

        loop {
            let n = self.read(&mut chunk, 0, len)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }
}

/// A stream bytes can be written to.
pub trait Writable: Stream {
    /// Writes all of `buf[offset..offset + size]`.
    ///
    /// # Errors
    /// - [`Error::Closed`] if the stream was closed
    /// - [`Error::Io`] with `InvalidInput` if the range does not fit `buf`
    fn write(&mut self, buf: &[u8], offset: usize, size: usize) -> Result<()>;

    /// Pushes buffered data to the underlying sink.
    fn flush(&mut self) -> Result<()>;

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.write(buf, 0, buf.len())
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_all(s.as_bytes())
    }
}

/// A stream that is both [`Readable`] and [`Writable`].
pub trait Duplex: Readable + Writable {}

impl<S: Readable + Writable + ?Sized> Duplex for S {}

/// Checks that `offset..offset + size` lies inside a buffer of `len` bytes.
pub(crate) fn check_range(len: usize, offset: usize, size: usize) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("range {offset}+{size} is out of bounds for a buffer of {len} bytes"),
        ))),
    }
}
