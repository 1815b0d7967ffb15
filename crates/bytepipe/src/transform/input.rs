use tracing::{debug, trace};

use super::Transform;
use crate::{
    error::{Result, StreamError},
    options::TransformStreamOptions,
    owner::OwnerThread,
    stream::InputStream,
};

/// Pulls raw bytes from a source and yields them transformed.
///
/// Owns a single staging buffer of
/// [`TransformStreamOptions::buffer_size`] bytes holding raw input not yet
/// accepted by the transform.
pub struct TransformInputStream<S, T> {
    source: S,
    transform: T,
    staging: Box<[u8]>,
    filled: usize,
    source_done: bool,
    done: bool,
    owner: OwnerThread,
}

impl<S: InputStream, T: Transform> TransformInputStream<S, T> {
    pub fn new(source: S, transform: T) -> Self {
        Self::build(source, transform, TransformStreamOptions::default())
    }

    /// # Errors
    ///
    /// [`StreamError::InvalidArgument`] for a zero buffer size.
    pub fn with_options(source: S, transform: T, options: TransformStreamOptions) -> Result<Self> {
        Ok(Self::build(source, transform, options.validate()?))
    }

    fn build(source: S, transform: T, options: TransformStreamOptions) -> Self {
        Self {
            source,
            transform,
            staging: vec![0; options.buffer_size].into_boxed_slice(),
            filled: 0,
            source_done: false,
            done: false,
            owner: OwnerThread::current(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> (S, T) {
        (self.source, self.transform)
    }

    /// Makes the calling thread the owner.
    pub fn reassign_thread(&mut self) {
        self.owner.reassign();
    }

    /// Releases ownership; the next thread to read claims it.
    pub fn unassign_thread(&mut self) {
        self.owner.unassign();
    }

    fn refill(&mut self) -> Result<()> {
        let n = self.source.read(&mut self.staging[self.filled..])?;
        trace!(transform = self.transform.name(), n, "refill");
        if n == 0 {
            self.source_done = true;
        }
        self.filled += n;
        Ok(())
    }
}

impl<S: InputStream, T: Transform> InputStream for TransformInputStream<S, T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.owner.check("transform input stream")?;
        if buf.is_empty() || self.done {
            return Ok(0);
        }
        loop {
            if !self.source_done && self.filled < self.staging.len() {
                self.refill()?;
            }
            let src = if self.source_done && self.filled == 0 {
                None
            } else {
                Some(&self.staging[..self.filled])
            };
            let flushing = src.is_none();
            let (consumed, produced) = self.transform.apply(src, buf)?;
            if consumed > 0 {
                self.staging.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;
            }
            if produced > 0 {
                return Ok(produced);
            }
            if flushing {
                self.done = true;
                debug!(transform = self.transform.name(), "transform input drained");
                return Ok(0);
            }
            if consumed == 0 && (self.source_done || self.filled == self.staging.len()) {
                return Err(StreamError::state(format!(
                    "{} transform made no progress on {} staged bytes",
                    self.transform.name(),
                    self.filled
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::rstest;

    use super::*;
    use crate::{
        encoding::{UTF_8, UTF_16LE},
        stream::{BinaryInputStream, ChunkedInputStream},
        transform::{CompressionAlgorithm, EncodingConvertor, compress},
    };

    #[rstest]
    #[case(1, 1)]
    #[case(1, 4096)]
    #[case(7, 3)]
    #[case(4096, 4096)]
    fn inflates_under_any_buffering(#[case] staging: usize, #[case] read_size: usize) {
        let data = b"line of text that repeats\n".repeat(2_000);
        let packed = compress("zlib", &data, 6).unwrap();
        let source = ChunkedInputStream::new(BinaryInputStream::new(packed), 13).unwrap();
        let mut stream = TransformInputStream::with_options(
            source,
            CompressionAlgorithm::Zlib.decompressor(),
            TransformStreamOptions {
                buffer_size: staging,
            },
        )
        .unwrap();

        let mut out = Vec::new();
        let mut buf = vec![0u8; read_size];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn converts_encoding_while_reading() {
        let source = BinaryInputStream::new("grüße".as_bytes().to_vec());
        let mut stream =
            TransformInputStream::new(source, EncodingConvertor::new(&UTF_8, &UTF_16LE));
        let wide: Vec<u8> = "grüße".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(stream.read_to_end().unwrap(), wide);
    }

    #[test]
    fn corrupt_source_surfaces_codec_error() {
        let source = BinaryInputStream::new(b"definitely not zlib".to_vec());
        let mut stream =
            TransformInputStream::new(source, CompressionAlgorithm::Zlib.decompressor());
        let err = stream.read_to_end().unwrap_err();
        assert!(matches!(err, StreamError::Decompression { .. }), "{err}");
    }

    #[test]
    fn owner_thread_is_enforced() {
        let source = BinaryInputStream::new(b"abc".to_vec());
        let stream = TransformInputStream::new(source, EncodingConvertor::new(&UTF_8, &UTF_8));
        let mut stream = thread::spawn(move || {
            let mut stream = stream;
            let mut buf = [0u8; 4];
            assert!(matches!(stream.read(&mut buf), Err(StreamError::StreamState(_))));
            stream.unassign_thread();
            stream
        })
        .join()
        .unwrap();
        assert_eq!(stream.read_to_end().unwrap(), b"abc");
    }
}
