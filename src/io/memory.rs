use crate::error::{Error, Result};
use crate::io::{Readable, Stream, Writable, check_range};

/// An in-memory duplex stream.
///
/// Writes append to the end of the buffer; reads consume from a separate
/// read position, so the stream behaves like a pipe whose contents stay
/// inspectable through [`Self::as_bytes`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStream {
    buffer: Vec<u8>,
    position: usize,
    closed: bool,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream whose unread contents are `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: bytes.into(),
            position: 0,
            closed: false,
        }
    }

    /// Everything written so far, including bytes already read.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of bytes not read yet.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl Stream for MemoryStream {
    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Readable for MemoryStream {
    fn read(&mut self, buf: &mut [u8], offset: usize, size: usize) -> Result<usize> {
        check_range(buf.len(), offset, size)?;
        if self.closed {
            return Err(Error::Closed);
        }

        let n = size.min(self.remaining());
        buf[offset..offset + n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;

        Ok(n)
    }
}

impl Writable for MemoryStream {
    fn write(&mut self, buf: &[u8], offset: usize, size: usize) -> Result<()> {
        check_range(buf.len(), offset, size)?;
        if self.closed {
            return Err(Error::Closed);
        }

        self.buffer.extend_from_slice(&buf[offset..offset + size]);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}
