//! Adapters from `std::io` handles.

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind, PipeReader, PipeWriter, Read, Stderr, Stdout, Write},
    path::Path,
};

use tracing::debug;

use super::{InputStream, OutputStream, closed};
use crate::error::Result;

/// Reads from any [`Read`] implementation.
///
/// No timeout is imposed here. A handle that carries its own, such as a
/// socket after `set_read_timeout`, reports expiry as [`StreamError::Io`]
/// with kind `TimedOut` or `WouldBlock`, and the stream stays usable for a
/// retry. `Interrupted` reads are retried internally.
///
/// [`StreamError::Io`]: crate::StreamError::Io
#[derive(Debug)]
pub struct ReadInputStream<R> {
    inner: R,
}

impl<R: Read> ReadInputStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> InputStream for ReadInputStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Writes to any [`Write`] implementation; closing flushes and drops the
/// handle.
#[derive(Debug)]
pub struct WriteOutputStream<W: Write> {
    inner: Option<W>,
    label: &'static str,
}

impl<W: Write> WriteOutputStream<W> {
    pub fn new(inner: W) -> Self {
        Self::labelled(inner, "output stream")
    }

    fn labelled(inner: W, label: &'static str) -> Self {
        Self {
            inner: Some(inner),
            label,
        }
    }

    /// The wrapped handle, or `None` once closed.
    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    pub fn into_inner(mut self) -> Option<W> {
        self.inner.take()
    }
}

impl<W: Write> OutputStream for WriteOutputStream<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let inner = self.inner.as_mut().ok_or_else(|| closed(self.label))?;
        inner.write_all(data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut inner = self.inner.take().ok_or_else(|| closed(self.label))?;
        inner.flush()?;
        debug!(stream = self.label, "closed");
        Ok(())
    }
}

/// File reads block until data or end of file; there is no timeout to set.
pub type FileInputStream = ReadInputStream<File>;

impl ReadInputStream<File> {
    /// # Errors
    ///
    /// The I/O error from opening the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

pub type FileOutputStream = WriteOutputStream<File>;

impl WriteOutputStream<File> {
    /// Creates or truncates the file, or appends to it when `append` is set.
    ///
    /// # Errors
    ///
    /// The I/O error from opening the file.
    pub fn create(path: impl AsRef<Path>, append: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Self::labelled(file, "file output stream"))
    }
}

pub type StdoutOutputStream = WriteOutputStream<Stdout>;

impl WriteOutputStream<Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::labelled(io::stdout(), "stdout")
    }
}

pub type StderrOutputStream = WriteOutputStream<Stderr>;

impl WriteOutputStream<Stderr> {
    #[must_use]
    pub fn stderr() -> Self {
        Self::labelled(io::stderr(), "stderr")
    }
}

/// Pipe reads block until the write end sends data or closes. Wrap a
/// handle with its own timeout in [`ReadInputStream`] when one is needed.
pub type PipeInputStream = ReadInputStream<PipeReader>;
pub type PipeOutputStream = WriteOutputStream<PipeWriter>;

/// Opens an anonymous OS pipe. The read end reports end of stream once the
/// write end is closed or dropped.
///
/// # Errors
///
/// The I/O error from creating the pipe.
pub fn pipe() -> Result<(PipeInputStream, PipeOutputStream)> {
    let (reader, writer) = io::pipe()?;
    Ok((
        ReadInputStream::new(reader),
        WriteOutputStream::labelled(writer, "pipe"),
    ))
}
