//! Pull and push byte stream contracts.
//!
//! Sources implement [`InputStream`], sinks implement [`OutputStream`]. Both
//! are deliberately small so file, memory, pipe and transform adapters are
//! interchangeable behind `Box<dyn ...>` or a generic parameter.

mod io;
mod memory;

pub use io::{
    FileInputStream, FileOutputStream, PipeInputStream, PipeOutputStream, ReadInputStream,
    StderrOutputStream, StdoutOutputStream, WriteOutputStream, pipe,
};
pub use memory::{
    BinaryInputStream, BinaryOutputStream, ChunkedInputStream, StringInputStream,
    StringOutputStream,
};

use crate::error::Result;

/// A source of bytes.
pub trait InputStream {
    /// Reads at most `buf.len()` bytes into the front of `buf`.
    ///
    /// Returns the number of bytes read; `0` means end of stream (or an
    /// empty `buf`).
    ///
    /// # Errors
    ///
    /// Source-specific I/O or codec errors.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads until end of stream.
    ///
    /// # Errors
    ///
    /// Whatever [`read`](Self::read) returns.
    fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match self.read(&mut chunk)? {
                0 => return Ok(out),
                n => out.extend_from_slice(&chunk[..n]),
            }
        }
    }
}

/// A sink for bytes.
pub trait OutputStream {
    /// Writes all of `data`.
    ///
    /// # Errors
    ///
    /// [`StreamError::StreamState`](crate::StreamError::StreamState) after
    /// [`close`](Self::close), or sink-specific errors.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flushes pending output and releases the sink. Writing afterwards is
    /// an error.
    ///
    /// # Errors
    ///
    /// Sink-specific errors, or a state error when already closed.
    fn close(&mut self) -> Result<()>;
}

impl<T: InputStream + ?Sized> InputStream for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

impl<T: InputStream + ?Sized> InputStream for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

impl<T: OutputStream + ?Sized> OutputStream for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: OutputStream + ?Sized> OutputStream for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

pub(crate) fn closed(what: &str) -> crate::StreamError {
    crate::StreamError::state(format!("{what} is already closed"))
}
