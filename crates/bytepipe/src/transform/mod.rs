//! Single-pass, bounded-buffer codecs and the stream adapters that drive them.
//!
//! A [`Transform`] converts one byte stream into another under buffers the
//! caller supplies. It never reads more than `src.len()` bytes nor writes more
//! than `dst.len()` bytes per call, so pipelines run in constant memory with
//! small fixed staging buffers no matter how large the stream is.
//!
//! Driving protocol
//! - `apply(Some(src), dst)` offers input; the transform reports how much it
//!   consumed and produced. Unconsumed input must be offered again.
//! - `apply(None, dst)` is the flush/finish signal: no more input will ever
//!   arrive. The caller repeats it until it reports `produced == 0`, which
//!   means every buffered byte has been emitted.
//! - After an error the transform is unusable; every later call fails with
//!   [`StreamError::StreamState`](crate::StreamError::StreamState).
//!
//! [`TransformInputStream`] and [`TransformOutputStream`] hide this loop
//! behind the plain [`InputStream`](crate::InputStream) /
//! [`OutputStream`](crate::OutputStream) contracts.

mod compression;
mod convert;
mod gzip;
mod input;
mod output;

pub use compression::{
    CompressionAlgorithm, DEFAULT_LEVEL, compress, compressor, decompress, decompressor,
};
pub use convert::EncodingConvertor;
pub use input::TransformInputStream;
pub use output::TransformOutputStream;

use crate::error::{Result, StreamError};

/// Staging size used by [`transform_all`] and the default stream options.
pub(crate) const STAGING_SIZE: usize = 4096;

/// A stateful streaming codec.
pub trait Transform {
    /// Moves data through the codec.
    ///
    /// Returns `(consumed, produced)`: bytes taken from `src` and bytes
    /// written to the front of `dst`. `src == None` signals that input is
    /// finished; see the module docs for the draining protocol.
    ///
    /// # Errors
    ///
    /// Codec-specific errors for corrupt input or illegal sequences, and
    /// [`StreamError::InvalidArgument`] if `dst` is empty.
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)>;

    /// Short name used in diagnostics.
    fn name(&self) -> &str;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        (**self).apply(src, dst)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Transform + ?Sized> Transform for &mut T {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        (**self).apply(src, dst)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Runs `input` through `transform` to completion and collects the output.
///
/// # Errors
///
/// Whatever the transform raises; a transform that stops making progress on
/// pending input is reported as [`StreamError::StreamState`].
pub fn transform_all<T: Transform + ?Sized>(transform: &mut T, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut staging = [0u8; STAGING_SIZE];
    let mut offset = 0;
    while offset < input.len() {
        let (consumed, produced) = transform.apply(Some(&input[offset..]), &mut staging)?;
        out.extend_from_slice(&staging[..produced]);
        offset += consumed;
        if consumed == 0 && produced == 0 {
            return Err(stalled(transform.name()));
        }
    }
    loop {
        let (_, produced) = transform.apply(None, &mut staging)?;
        if produced == 0 {
            break;
        }
        out.extend_from_slice(&staging[..produced]);
    }
    Ok(out)
}

pub(crate) fn stalled(name: &str) -> StreamError {
    StreamError::state(format!("{name} transform made no progress on pending input"))
}

pub(crate) fn check_dst(dst: &[u8]) -> Result<()> {
    if dst.is_empty() {
        return Err(StreamError::invalid("transform output buffer must not be empty"));
    }
    Ok(())
}

pub(crate) fn poisoned(name: &str) -> StreamError {
    StreamError::state(format!("{name} transform is unusable after a previous error"))
}

/// Harness for exercising transforms under hostile buffering.
#[cfg(any(test, feature = "fuzzing"))]
pub mod testing {
    use super::Transform;
    use crate::error::Result;

    /// Drives `transform` with fixed-size input slices and output windows,
    /// checking the bound contract on every call.
    ///
    /// # Errors
    ///
    /// Whatever the transform raises.
    ///
    /// # Panics
    ///
    /// If a call reads or writes past its bounds, or stalls.
    pub fn drive<T: Transform + ?Sized>(
        transform: &mut T,
        input: &[u8],
        src_window: usize,
        dst_window: usize,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut dst = vec![0u8; dst_window];
        let mut offset = 0;
        let mut idle = 0;
        while offset < input.len() {
            let end = (offset + src_window).min(input.len());
            let (consumed, produced) = transform.apply(Some(&input[offset..end]), &mut dst)?;
            assert!(consumed <= end - offset, "consumed past src bound");
            assert!(produced <= dst_window, "produced past dst bound");
            out.extend_from_slice(&dst[..produced]);
            offset += consumed;
            idle = if consumed == 0 && produced == 0 { idle + 1 } else { 0 };
            assert!(idle < 2, "transform stalled");
        }
        loop {
            let (consumed, produced) = transform.apply(None, &mut dst)?;
            assert_eq!(consumed, 0);
            assert!(produced <= dst_window, "produced past dst bound");
            if produced == 0 {
                break;
            }
            out.extend_from_slice(&dst[..produced]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::encoding::{UTF_8, UTF_16LE};

    fn finished(mut transform: Box<dyn Transform>, input: &[u8]) -> Box<dyn Transform> {
        transform_all(&mut transform, input).unwrap();
        transform
    }

    fn assert_terminal(mut transform: Box<dyn Transform>) {
        let mut dst = [0u8; 64];
        let err = transform.apply(Some(b"late"), &mut dst).unwrap_err();
        assert!(!matches!(err, StreamError::StreamState(_)), "{err}");
        let err = transform.apply(Some(b"late"), &mut dst).unwrap_err();
        assert!(matches!(err, StreamError::StreamState(_)), "{err}");
        let flushed = transform.apply(None, &mut dst);
        assert!(matches!(flushed, Err(StreamError::StreamState(_))));
    }

    #[rstest]
    fn compressor_is_terminal_after_finish(
        #[values(
            CompressionAlgorithm::Zlib,
            CompressionAlgorithm::Deflate,
            CompressionAlgorithm::Gzip,
            CompressionAlgorithm::Bzip2
        )]
        algorithm: CompressionAlgorithm,
    ) {
        let transform = algorithm.compressor(DEFAULT_LEVEL).unwrap();
        assert_terminal(finished(transform, &b"record ".repeat(64)));
    }

    #[rstest]
    fn decompressor_is_terminal_after_finish(
        #[values(
            CompressionAlgorithm::Zlib,
            CompressionAlgorithm::Deflate,
            CompressionAlgorithm::Gzip,
            CompressionAlgorithm::Bzip2
        )]
        algorithm: CompressionAlgorithm,
    ) {
        let packed = compress(algorithm.as_str(), &b"record ".repeat(64), DEFAULT_LEVEL).unwrap();
        assert_terminal(finished(algorithm.decompressor(), &packed));
    }

    #[test]
    fn convertor_is_terminal_after_finish() {
        let transform = Box::new(EncodingConvertor::new(&UTF_8, &UTF_16LE));
        assert_terminal(finished(transform, "récord".as_bytes()));
    }
}
