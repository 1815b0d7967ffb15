use tracing::debug;

use super::{InputStream, OutputStream, closed};
use crate::{
    buffer::ByteBuffer,
    encoding::Encoding,
    error::{Result, StreamError},
};

/// Reads from an owned byte vector.
#[derive(Debug, Clone, Default)]
pub struct BinaryInputStream {
    data: Vec<u8>,
    pos: usize,
}

impl BinaryInputStream {
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }
}

impl InputStream for BinaryInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Reads the bytes of a [`ByteBuffer`] and remembers its encoding.
#[derive(Debug, Clone)]
pub struct StringInputStream {
    inner: BinaryInputStream,
    encoding: &'static Encoding,
}

impl StringInputStream {
    #[must_use]
    pub fn new(text: ByteBuffer) -> Self {
        let encoding = text.encoding();
        Self {
            inner: BinaryInputStream::new(text.into_bytes()),
            encoding,
        }
    }

    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

impl From<&str> for StringInputStream {
    fn from(text: &str) -> Self {
        Self::new(ByteBuffer::from(text))
    }
}

impl InputStream for StringInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }
}

/// Caps every read of the wrapped stream at `chunk` bytes.
///
/// Useful to exercise consumers against sources that return short reads.
#[derive(Debug)]
pub struct ChunkedInputStream<S> {
    inner: S,
    chunk: usize,
}

impl<S: InputStream> ChunkedInputStream<S> {
    /// # Errors
    ///
    /// [`StreamError::InvalidArgument`] when `chunk` is zero.
    pub fn new(inner: S, chunk: usize) -> Result<Self> {
        if chunk == 0 {
            return Err(StreamError::invalid("chunk size must be positive"));
        }
        Ok(Self { inner, chunk })
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: InputStream> InputStream for ChunkedInputStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = buf.len().min(self.chunk);
        self.inner.read(&mut buf[..limit])
    }
}

/// Collects written bytes in memory.
#[derive(Debug, Clone, Default)]
pub struct BinaryOutputStream {
    data: Vec<u8>,
    closed: bool,
}

impl BinaryOutputStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl OutputStream for BinaryOutputStream {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(closed("binary output stream"));
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed("binary output stream"));
        }
        self.closed = true;
        debug!(bytes = self.data.len(), "binary output stream closed");
        Ok(())
    }
}

/// Collects written bytes into a [`ByteBuffer`] tagged with a fixed
/// encoding. Bytes are appended as-is; the writer is responsible for
/// producing that encoding.
#[derive(Debug, Clone)]
pub struct StringOutputStream {
    buffer: ByteBuffer,
    closed: bool,
}

impl StringOutputStream {
    #[must_use]
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            buffer: ByteBuffer::new(encoding),
            closed: false,
        }
    }

    #[must_use]
    pub fn buffer(&self) -> &ByteBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn into_buffer(self) -> ByteBuffer {
        self.buffer
    }
}

impl OutputStream for StringOutputStream {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(closed("string output stream"));
        }
        self.buffer.concat(data);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed("string output stream"));
        }
        self.closed = true;
        debug!(
            bytes = self.buffer.len(),
            encoding = self.buffer.encoding().name(),
            "string output stream closed"
        );
        Ok(())
    }
}
