//! zlib / raw deflate / gzip / bzip2 transforms and the algorithm factory.

use core::{fmt, str::FromStr};

use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::{debug, trace};

use super::{
    Transform, check_dst,
    gzip::{GzipCompressor, GzipDecompressor},
    poisoned, transform_all,
};
use crate::error::{Result, StreamError};

/// Sentinel level selecting each codec's default.
pub const DEFAULT_LEVEL: i32 = -1;

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    /// Deflate with the two-byte zlib header and adler32 trailer.
    Zlib,
    /// Raw deflate, no framing.
    Deflate,
    /// Deflate framed by a gzip header and crc32/size trailer.
    Gzip,
    Bzip2,
}

impl CompressionAlgorithm {
    /// Name accepted by [`FromStr`] and shown in errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zlib => "zlib",
            Self::Deflate => "deflate",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        }
    }

    /// Builds a compressing transform.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidArgument`] if `level` is neither
    /// [`DEFAULT_LEVEL`] nor in `0..=9`.
    pub fn compressor(self, level: i32) -> Result<Box<dyn Transform + Send>> {
        let level = Level::new(level)?;
        Ok(match self {
            Self::Zlib => Box::new(DeflateCompressor::new(self, level, true)),
            Self::Deflate => Box::new(DeflateCompressor::new(self, level, false)),
            Self::Gzip => Box::new(GzipCompressor::new(level)),
            Self::Bzip2 => Box::new(Bzip2Compressor::new(level)),
        })
    }

    /// Builds a decompressing transform.
    #[must_use]
    pub fn decompressor(self) -> Box<dyn Transform + Send> {
        match self {
            Self::Zlib => Box::new(DeflateDecompressor::new(self, true)),
            Self::Deflate => Box::new(DeflateDecompressor::new(self, false)),
            Self::Gzip => Box::new(GzipDecompressor::new()),
            Self::Bzip2 => Box::new(Bzip2Decompressor::new()),
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zlib" => Ok(Self::Zlib),
            "deflate" => Ok(Self::Deflate),
            "gzip" => Ok(Self::Gzip),
            "bzip2" => Ok(Self::Bzip2),
            _ => Err(StreamError::Compression {
                algorithm: s.to_owned().into(),
                detail: "unknown compression algorithm".into(),
            }),
        }
    }
}

/// Creates a compressing transform for a named algorithm.
///
/// # Errors
///
/// [`StreamError::Compression`] naming an unknown algorithm;
/// [`StreamError::InvalidArgument`] for an out-of-range level.
pub fn compressor(algorithm: &str, level: i32) -> Result<Box<dyn Transform + Send>> {
    algorithm.parse::<CompressionAlgorithm>()?.compressor(level)
}

/// Creates a decompressing transform for a named algorithm.
///
/// # Errors
///
/// [`StreamError::Decompression`] naming an unknown algorithm.
pub fn decompressor(algorithm: &str) -> Result<Box<dyn Transform + Send>> {
    match algorithm.parse::<CompressionAlgorithm>() {
        Ok(alg) => Ok(alg.decompressor()),
        Err(_) => Err(StreamError::Decompression {
            algorithm: algorithm.to_owned().into(),
            detail: "unknown compression algorithm".into(),
        }),
    }
}

/// Compresses `data` in one call.
///
/// # Errors
///
/// See [`compressor`].
pub fn compress(algorithm: &str, data: &[u8], level: i32) -> Result<Vec<u8>> {
    transform_all(&mut compressor(algorithm, level)?, data)
}

/// Decompresses a complete compressed `data` buffer.
///
/// # Errors
///
/// See [`decompressor`]; corrupt or truncated input raises
/// [`StreamError::Decompression`].
pub fn decompress(algorithm: &str, data: &[u8]) -> Result<Vec<u8>> {
    transform_all(&mut decompressor(algorithm)?, data)
}

/// Validated compression level; `None` is the codec default.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Level(Option<u32>);

impl Level {
    fn new(level: i32) -> Result<Self> {
        match level {
            DEFAULT_LEVEL => Ok(Self(None)),
            0..=9 => Ok(Self(u32::try_from(level).ok())),
            _ => Err(StreamError::invalid(format!(
                "compression level {level} is outside [0, 9] and is not the default (-1)"
            ))),
        }
    }

    pub(crate) fn flate(self) -> flate2::Compression {
        match self.0 {
            Some(level) => flate2::Compression::new(level),
            None => flate2::Compression::default(),
        }
    }

    /// bzip2 block sizes run 1..=9; level 0 maps to the smallest block.
    fn bzip2(self) -> bzip2::Compression {
        match self.0 {
            Some(level) => bzip2::Compression::new(level.max(1)),
            None => bzip2::Compression::default(),
        }
    }
}

/// Byte counts moved by one codec call, from the codec's running totals.
fn moved(before: (u64, u64), after: (u64, u64)) -> (usize, usize) {
    // Each call is bounded by slice lengths, so the deltas fit in usize.
    let consumed = usize::try_from(after.0 - before.0).unwrap_or(usize::MAX);
    let produced = usize::try_from(after.1 - before.1).unwrap_or(usize::MAX);
    (consumed, produced)
}

/// Lifecycle shared by every codec wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Running,
    Finished,
    Failed,
}

pub(crate) struct DeflateCompressor {
    algorithm: CompressionAlgorithm,
    inner: Compress,
    phase: Phase,
}

impl DeflateCompressor {
    pub(crate) fn new(algorithm: CompressionAlgorithm, level: Level, zlib_header: bool) -> Self {
        Self {
            algorithm,
            inner: Compress::new(level.flate(), zlib_header),
            phase: Phase::Running,
        }
    }

    /// Whether the end-of-stream marker has been written.
    pub(crate) fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }
}

impl Transform for DeflateCompressor {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        check_dst(dst)?;
        let name = self.algorithm.as_str();
        match (self.phase, src) {
            (Phase::Failed, _) => return Err(poisoned(name)),
            (Phase::Finished, None) => return Ok((0, 0)),
            (Phase::Finished, Some(_)) => {
                self.phase = Phase::Failed;
                return Err(StreamError::compression(
                    name,
                    "input offered after the stream was finished",
                ));
            }
            (Phase::Running, _) => {}
        }
        let (input, flush) = match src {
            Some(input) => (input, FlushCompress::None),
            None => (&[][..], FlushCompress::Finish),
        };
        let before = (self.inner.total_in(), self.inner.total_out());
        let status = self.inner.compress(input, dst, flush).map_err(|e| {
            self.phase = Phase::Failed;
            StreamError::compression(name, e.to_string())
        })?;
        let total_out = self.inner.total_out();
        if status == Status::StreamEnd {
            debug!(algorithm = name, total_out, "compression finished");
            self.phase = Phase::Finished;
        }
        let (consumed, produced) = moved(before, (self.inner.total_in(), total_out));
        trace!(algorithm = name, consumed, produced, "deflate");
        Ok((consumed, produced))
    }

    fn name(&self) -> &str {
        self.algorithm.as_str()
    }
}

pub(crate) struct DeflateDecompressor {
    algorithm: CompressionAlgorithm,
    inner: Decompress,
    phase: Phase,
}

impl DeflateDecompressor {
    pub(crate) fn new(algorithm: CompressionAlgorithm, zlib_header: bool) -> Self {
        Self {
            algorithm,
            inner: Decompress::new(zlib_header),
            phase: Phase::Running,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }
}

impl Transform for DeflateDecompressor {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        check_dst(dst)?;
        let name = self.algorithm.as_str();
        match (self.phase, src) {
            (Phase::Failed, _) => return Err(poisoned(name)),
            (Phase::Finished, None) => return Ok((0, 0)),
            (Phase::Finished, Some(extra)) if extra.is_empty() => return Ok((0, 0)),
            (Phase::Finished, Some(extra)) => {
                self.phase = Phase::Failed;
                let len = extra.len();
                return Err(StreamError::decompression(
                    name,
                    format!("unexpected extra bytes after end of stream ({len} bytes)"),
                ));
            }
            (Phase::Running, _) => {}
        }
        let input = src.unwrap_or_default();
        let before = (self.inner.total_in(), self.inner.total_out());
        let status = self
            .inner
            .decompress(input, dst, FlushDecompress::None)
            .map_err(|e| {
                self.phase = Phase::Failed;
                StreamError::decompression(name, e.to_string())
            })?;
        let total_out = self.inner.total_out();
        let (consumed, produced) = moved(before, (self.inner.total_in(), total_out));
        if status == Status::StreamEnd {
            debug!(algorithm = name, total_out, "end of compressed stream");
            self.phase = Phase::Finished;
        } else if src.is_none() && produced == 0 {
            self.phase = Phase::Failed;
            return Err(StreamError::decompression(name, "premature end of compressed stream"));
        }
        Ok((consumed, produced))
    }

    fn name(&self) -> &str {
        self.algorithm.as_str()
    }
}

pub(crate) struct Bzip2Compressor {
    inner: bzip2::Compress,
    phase: Phase,
}

impl Bzip2Compressor {
    fn new(level: Level) -> Self {
        Self {
            inner: bzip2::Compress::new(level.bzip2(), 0),
            phase: Phase::Running,
        }
    }
}

impl Transform for Bzip2Compressor {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        check_dst(dst)?;
        let name = CompressionAlgorithm::Bzip2.as_str();
        match (self.phase, src) {
            (Phase::Failed, _) => return Err(poisoned(name)),
            (Phase::Finished, None) => return Ok((0, 0)),
            (Phase::Finished, Some(_)) => {
                self.phase = Phase::Failed;
                return Err(StreamError::compression(
                    name,
                    "input offered after the stream was finished",
                ));
            }
            (Phase::Running, _) => {}
        }
        let (input, action) = match src {
            Some(input) => (input, bzip2::Action::Run),
            None => (&[][..], bzip2::Action::Finish),
        };
        let before = (self.inner.total_in(), self.inner.total_out());
        let status = self.inner.compress(input, dst, action).map_err(|e| {
            self.phase = Phase::Failed;
            StreamError::compression(name, e.to_string())
        })?;
        let total_out = self.inner.total_out();
        if matches!(status, bzip2::Status::StreamEnd) {
            debug!(algorithm = name, total_out, "compression finished");
            self.phase = Phase::Finished;
        }
        Ok(moved(before, (self.inner.total_in(), total_out)))
    }

    fn name(&self) -> &str {
        CompressionAlgorithm::Bzip2.as_str()
    }
}

pub(crate) struct Bzip2Decompressor {
    inner: bzip2::Decompress,
    phase: Phase,
}

impl Bzip2Decompressor {
    fn new() -> Self {
        Self {
            inner: bzip2::Decompress::new(false),
            phase: Phase::Running,
        }
    }
}

impl Transform for Bzip2Decompressor {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        check_dst(dst)?;
        let name = CompressionAlgorithm::Bzip2.as_str();
        match (self.phase, src) {
            (Phase::Failed, _) => return Err(poisoned(name)),
            (Phase::Finished, None) => return Ok((0, 0)),
            (Phase::Finished, Some(extra)) if extra.is_empty() => return Ok((0, 0)),
            (Phase::Finished, Some(extra)) => {
                self.phase = Phase::Failed;
                let len = extra.len();
                return Err(StreamError::decompression(
                    name,
                    format!("unexpected extra bytes after end of stream ({len} bytes)"),
                ));
            }
            (Phase::Running, _) => {}
        }
        let input = src.unwrap_or_default();
        let before = (self.inner.total_in(), self.inner.total_out());
        let status = self.inner.decompress(input, dst).map_err(|e| {
            self.phase = Phase::Failed;
            StreamError::decompression(name, e.to_string())
        })?;
        let total_out = self.inner.total_out();
        let (consumed, produced) = moved(before, (self.inner.total_in(), total_out));
        if matches!(status, bzip2::Status::StreamEnd) {
            debug!(algorithm = name, total_out, "end of compressed stream");
            self.phase = Phase::Finished;
        } else if src.is_none() && produced == 0 {
            self.phase = Phase::Failed;
            return Err(StreamError::decompression(name, "premature end of compressed stream"));
        }
        Ok((consumed, produced))
    }

    fn name(&self) -> &str {
        CompressionAlgorithm::Bzip2.as_str()
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::QuickCheck;
    use rstest::rstest;

    use super::*;
    use crate::transform::testing::drive;

    fn sample() -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..2000u32 {
            data.extend_from_slice(format!("line {i}: the quick brown fox\n").as_bytes());
        }
        data
    }

    #[rstest]
    fn round_trip_every_level(
        #[values("zlib", "deflate", "gzip", "bzip2")] algorithm: &str,
        #[values(DEFAULT_LEVEL, 0, 1, 5, 9)] level: i32,
    ) {
        let data = sample();
        let packed = compress(algorithm, &data, level).unwrap();
        assert_eq!(decompress(algorithm, &packed).unwrap(), data);
    }

    #[rstest]
    fn one_byte_windows(#[values("zlib", "deflate", "gzip", "bzip2")] algorithm: &str) {
        let data = sample();
        let mut c = compressor(algorithm, DEFAULT_LEVEL).unwrap();
        let packed = drive(&mut c, &data, 7, 1).unwrap();
        let mut d = decompressor(algorithm).unwrap();
        assert_eq!(drive(&mut d, &packed, 1, 1).unwrap(), data);
    }

    #[rstest]
    fn empty_input_round_trips(#[values("zlib", "deflate", "gzip", "bzip2")] algorithm: &str) {
        let packed = compress(algorithm, b"", DEFAULT_LEVEL).unwrap();
        assert!(!packed.is_empty());
        assert_eq!(decompress(algorithm, &packed).unwrap(), b"");
    }

    #[test]
    fn unknown_algorithm_is_named() {
        let err = compressor("lzma", 5).err().unwrap();
        assert!(matches!(err, StreamError::Compression { algorithm, .. } if algorithm == "lzma"));
        let err = decompressor("lzma").err().unwrap();
        assert!(matches!(err, StreamError::Decompression { algorithm, .. } if algorithm == "lzma"));
    }

    #[rstest]
    #[case(10)]
    #[case(-2)]
    fn out_of_range_level(#[case] level: i32) {
        let err = compressor("gzip", level).err().unwrap();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }

    #[rstest]
    fn trailing_garbage_is_rejected(#[values("zlib", "bzip2")] algorithm: &str) {
        let mut packed = compress(algorithm, b"payload", DEFAULT_LEVEL).unwrap();
        packed.extend_from_slice(b"junk");
        let err = decompress(algorithm, &packed).unwrap_err();
        assert!(err.to_string().contains("unexpected extra bytes"), "{err}");
    }

    #[rstest]
    fn truncated_stream_is_rejected(#[values("zlib", "deflate", "bzip2")] algorithm: &str) {
        let packed = compress(algorithm, &sample(), DEFAULT_LEVEL).unwrap();
        let err = decompress(algorithm, &packed[..packed.len() / 2]).unwrap_err();
        assert!(matches!(err, StreamError::Decompression { .. }), "{err}");
    }

    #[test]
    fn corrupt_zlib_poisons_transform() {
        let mut d = decompressor("zlib").unwrap();
        let mut dst = [0u8; 64];
        assert!(d.apply(Some(b"\x00\x01\x02\x03"), &mut dst).is_err());
        let err = d.apply(None, &mut dst).unwrap_err();
        assert!(matches!(err, StreamError::StreamState(_)));
    }

    #[test]
    fn compressor_rejects_input_after_finish() {
        let mut c = compressor("zlib", 6).unwrap();
        let mut dst = [0u8; 256];
        while c.apply(None, &mut dst).unwrap().1 > 0 {}
        assert!(c.apply(Some(b"more"), &mut dst).is_err());
    }

    #[test]
    fn empty_destination_is_invalid() {
        let mut c = compressor("deflate", 6).unwrap();
        let err = c.apply(Some(b"abc"), &mut []).unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }

    #[test]
    fn algorithm_names_round_trip() {
        for alg in [
            CompressionAlgorithm::Zlib,
            CompressionAlgorithm::Deflate,
            CompressionAlgorithm::Gzip,
            CompressionAlgorithm::Bzip2,
        ] {
            let parsed: CompressionAlgorithm = alg.to_string().parse().unwrap();
            assert_eq!(parsed, alg);
        }
    }

    #[test]
    fn compression_round_trip_quickcheck() {
        fn prop(data: Vec<u8>, level: u8, alg: u8) -> bool {
            let algorithm = ["zlib", "deflate", "gzip", "bzip2"][usize::from(alg % 4)];
            let level = i32::from(level % 11) - 1;
            let packed = compress(algorithm, &data, level).unwrap();
            decompress(algorithm, &packed).unwrap() == data
        }

        QuickCheck::new()
            .tests(crate::tests::iterations(100))
            .quickcheck(prop as fn(Vec<u8>, u8, u8) -> bool);
    }
}
