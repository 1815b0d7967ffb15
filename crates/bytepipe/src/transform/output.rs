use tracing::{debug, trace, warn};

use super::Transform;
use crate::{
    error::{Result, StreamError},
    options::TransformStreamOptions,
    owner::OwnerThread,
    stream::OutputStream,
};

/// Transforms written bytes and pushes the result to a sink.
///
/// [`close`](OutputStream::close) drains the transform and then closes the
/// sink. A stream dropped without being closed finishes the same way and
/// logs a warning if that fails.
pub struct TransformOutputStream<S: OutputStream, T: Transform> {
    sink: Option<S>,
    transform: T,
    staging: Box<[u8]>,
    closed: bool,
    owner: OwnerThread,
}

impl<S: OutputStream, T: Transform> TransformOutputStream<S, T> {
    pub fn new(sink: S, transform: T) -> Self {
        Self::build(sink, transform, TransformStreamOptions::default())
    }

    /// # Errors
    ///
    /// [`StreamError::InvalidArgument`] for a zero buffer size.
    pub fn with_options(sink: S, transform: T, options: TransformStreamOptions) -> Result<Self> {
        Ok(Self::build(sink, transform, options.validate()?))
    }

    fn build(sink: S, transform: T, options: TransformStreamOptions) -> Self {
        Self {
            sink: Some(sink),
            transform,
            staging: vec![0; options.buffer_size].into_boxed_slice(),
            closed: false,
            owner: OwnerThread::current(),
        }
    }

    pub fn get_ref(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// Closes the stream if needed and returns the sink.
    ///
    /// # Errors
    ///
    /// Errors from draining the transform or closing the sink.
    pub fn into_inner(mut self) -> Result<S> {
        if !self.closed {
            self.close()?;
        }
        self.sink
            .take()
            .ok_or_else(|| StreamError::state("transform output sink already taken"))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn reassign_thread(&mut self) {
        self.owner.reassign();
    }

    pub fn unassign_thread(&mut self) {
        self.owner.unassign();
    }

    fn open_sink(sink: &mut Option<S>) -> Result<&mut S> {
        sink.as_mut()
            .ok_or_else(|| StreamError::state("transform output sink already taken"))
    }

    fn finish(&mut self) -> Result<()> {
        self.closed = true;
        loop {
            let (_, produced) = self.transform.apply(None, &mut self.staging)?;
            if produced == 0 {
                break;
            }
            trace!(transform = self.transform.name(), produced, "drain");
            let chunk = &self.staging[..produced];
            Self::open_sink(&mut self.sink)?.write(chunk)?;
        }
        Self::open_sink(&mut self.sink)?.close()?;
        debug!(transform = self.transform.name(), "transform output closed");
        Ok(())
    }
}

impl<S: OutputStream, T: Transform> OutputStream for TransformOutputStream<S, T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.owner.check("transform output stream")?;
        if self.closed {
            return Err(crate::stream::closed("transform output stream"));
        }
        let mut offset = 0;
        while offset < data.len() {
            let pending = &data[offset..];
            let (consumed, produced) = self.transform.apply(Some(pending), &mut self.staging)?;
            if produced > 0 {
                let chunk = &self.staging[..produced];
                Self::open_sink(&mut self.sink)?.write(chunk)?;
            }
            if consumed == 0 && produced == 0 {
                return Err(super::stalled(self.transform.name()));
            }
            offset += consumed;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.owner.check("transform output stream")?;
        if self.closed {
            return Err(crate::stream::closed("transform output stream"));
        }
        self.finish()
    }
}

impl<S: OutputStream, T: Transform> Drop for TransformOutputStream<S, T> {
    fn drop(&mut self) {
        if self.closed || self.sink.is_none() {
            return;
        }
        if let Err(err) = self.finish() {
            warn!(
                transform = self.transform.name(),
                error = %err,
                "transform output stream dropped without close; finishing failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encoding::{UTF_8, UTF_16BE},
        stream::BinaryOutputStream,
        transform::{CompressionAlgorithm, EncodingConvertor, decompress},
    };

    #[test]
    fn compresses_into_sink_and_closes_it() {
        let mut stream = TransformOutputStream::with_options(
            BinaryOutputStream::new(),
            CompressionAlgorithm::Gzip.compressor(9).unwrap(),
            TransformStreamOptions { buffer_size: 5 },
        )
        .unwrap();
        for _ in 0..500 {
            stream.write(b"gzip me, ").unwrap();
        }
        stream.close().unwrap();
        assert!(matches!(stream.write(b"late"), Err(StreamError::StreamState(_))));
        assert!(stream.close().is_err());

        let sink = stream.into_inner().unwrap();
        assert!(sink.is_closed());
        let plain = decompress("gzip", sink.as_bytes()).unwrap();
        assert_eq!(plain, b"gzip me, ".repeat(500));
    }

    #[test]
    fn into_inner_finishes_an_open_stream() {
        let mut stream = TransformOutputStream::new(
            BinaryOutputStream::new(),
            EncodingConvertor::new(&UTF_8, &UTF_16BE),
        );
        stream.write("ok".as_bytes()).unwrap();
        let sink = stream.into_inner().unwrap();
        assert_eq!(sink.as_bytes(), [0, b'o', 0, b'k']);
    }

    #[test]
    fn conversion_error_is_reported_on_write() {
        let mut stream = TransformOutputStream::new(
            BinaryOutputStream::new(),
            EncodingConvertor::new(&UTF_8, &UTF_16BE),
        );
        let err = stream.write(&[0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, StreamError::EncodingConversion { .. }));
    }
}
