//! gzip framing (RFC 1952) around the raw deflate transforms.
//!
//! The header and trailer are produced and checked here so that the codec
//! backend only has to provide raw deflate; `flate2::Crc` tracks the checksum.

use flate2::Crc;
use tracing::debug;

use super::{
    Transform, check_dst,
    compression::{CompressionAlgorithm, DeflateCompressor, DeflateDecompressor, Level, Phase},
    poisoned,
};
use crate::error::{Result, StreamError};

const NAME: &str = "gzip";
const MAGIC: [u8; 2] = [0x1F, 0x8B];
const METHOD_DEFLATE: u8 = 8;
const OS_UNKNOWN: u8 = 0xFF;
const TRAILER_LEN: usize = 8;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const RESERVED: u8 = 0xE0;

/// Bytes queued for output ahead of (header) or after (trailer) the deflate
/// body.
#[derive(Default)]
struct Pending {
    bytes: Vec<u8>,
    pos: usize,
}

impl Pending {
    fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let n = (self.bytes.len() - self.pos).min(dst.len());
        dst[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

pub(crate) struct GzipCompressor {
    deflate: DeflateCompressor,
    crc: Crc,
    pending: Pending,
    trailer_queued: bool,
}

impl GzipCompressor {
    pub(crate) fn new(level: Level) -> Self {
        let xfl = match level.flate().level() {
            9 => 2,
            1 => 4,
            _ => 0,
        };
        let header = vec![
            MAGIC[0],
            MAGIC[1],
            METHOD_DEFLATE,
            0,
            0,
            0,
            0,
            0,
            xfl,
            OS_UNKNOWN,
        ];
        Self {
            deflate: DeflateCompressor::new(CompressionAlgorithm::Gzip, level, false),
            crc: Crc::new(),
            pending: Pending {
                bytes: header,
                pos: 0,
            },
            trailer_queued: false,
        }
    }
}

impl Transform for GzipCompressor {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        check_dst(dst)?;
        let mut produced = self.pending.drain_into(dst);
        if produced == dst.len() {
            return Ok((0, produced));
        }
        match src {
            Some(input) => {
                let (consumed, n) = self.deflate.apply(Some(input), &mut dst[produced..])?;
                self.crc.update(&input[..consumed]);
                Ok((consumed, produced + n))
            }
            None => {
                if !self.deflate.is_finished() {
                    let (_, n) = self.deflate.apply(None, &mut dst[produced..])?;
                    produced += n;
                }
                if self.deflate.is_finished() && !self.trailer_queued {
                    let mut trailer = Vec::with_capacity(TRAILER_LEN);
                    trailer.extend_from_slice(&self.crc.sum().to_le_bytes());
                    trailer.extend_from_slice(&self.crc.amount().to_le_bytes());
                    self.pending = Pending {
                        bytes: trailer,
                        pos: 0,
                    };
                    self.trailer_queued = true;
                }
                produced += self.pending.drain_into(&mut dst[produced..]);
                Ok((0, produced))
            }
        }
    }

    fn name(&self) -> &str {
        NAME
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Body,
    Trailer,
    Done,
}

pub(crate) struct GzipDecompressor {
    deflate: DeflateDecompressor,
    crc: Crc,
    stage: Stage,
    phase: Phase,
    /// Header or trailer bytes collected so far.
    frame: Vec<u8>,
}

impl GzipDecompressor {
    pub(crate) fn new() -> Self {
        Self {
            deflate: DeflateDecompressor::new(CompressionAlgorithm::Gzip, false),
            crc: Crc::new(),
            stage: Stage::Header,
            phase: Phase::Running,
            frame: Vec::with_capacity(16),
        }
    }

    fn fail(&mut self, detail: impl Into<String>) -> StreamError {
        self.phase = Phase::Failed;
        StreamError::decompression(NAME, detail)
    }

    /// Takes header bytes from `input`; returns how many were used.
    fn read_header(&mut self, input: &[u8]) -> Result<usize> {
        for (i, &b) in input.iter().enumerate() {
            self.frame.push(b);
            if let Some(len) = parse_header(&self.frame).map_err(|d| self.fail(d))? {
                debug_assert_eq!(len, self.frame.len());
                self.frame.clear();
                self.stage = Stage::Body;
                return Ok(i + 1);
            }
        }
        Ok(input.len())
    }

    fn read_trailer(&mut self, input: &[u8]) -> Result<usize> {
        let take = (TRAILER_LEN - self.frame.len()).min(input.len());
        self.frame.extend_from_slice(&input[..take]);
        if self.frame.len() == TRAILER_LEN {
            let f = &self.frame;
            let crc = u32::from_le_bytes([f[0], f[1], f[2], f[3]]);
            let size = u32::from_le_bytes([f[4], f[5], f[6], f[7]]);
            if crc != self.crc.sum() {
                return Err(self.fail(format!(
                    "crc32 mismatch: trailer {crc:#010x}, data {:#010x}",
                    self.crc.sum()
                )));
            }
            if size != self.crc.amount() {
                return Err(self.fail(format!(
                    "size mismatch: trailer {size}, data {}",
                    self.crc.amount()
                )));
            }
            debug!(algorithm = NAME, size, "end of compressed stream");
            self.stage = Stage::Done;
        }
        Ok(take)
    }
}

impl Transform for GzipDecompressor {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        check_dst(dst)?;
        if self.phase == Phase::Failed {
            return Err(poisoned(NAME));
        }
        let Some(input) = src else {
            return match self.stage {
                Stage::Done => Ok((0, 0)),
                Stage::Header | Stage::Trailer => {
                    Err(self.fail("premature end of compressed stream"))
                }
                Stage::Body => {
                    let (_, produced) = self.deflate.apply(None, dst).inspect_err(|_| {
                        self.phase = Phase::Failed;
                    })?;
                    self.crc.update(&dst[..produced]);
                    if self.deflate.is_finished() {
                        self.stage = Stage::Trailer;
                        if produced == 0 {
                            return Err(self.fail("premature end of compressed stream"));
                        }
                    }
                    Ok((0, produced))
                }
            };
        };

        let mut consumed = 0;
        let mut produced = 0;
        loop {
            let rest = &input[consumed..];
            match self.stage {
                Stage::Header => {
                    if rest.is_empty() {
                        break;
                    }
                    consumed += self.read_header(rest)?;
                }
                Stage::Body => {
                    if produced == dst.len() {
                        break;
                    }
                    let (c, p) = self
                        .deflate
                        .apply(Some(rest), &mut dst[produced..])
                        .inspect_err(|_| self.phase = Phase::Failed)?;
                    self.crc.update(&dst[produced..produced + p]);
                    consumed += c;
                    produced += p;
                    if self.deflate.is_finished() {
                        self.stage = Stage::Trailer;
                    } else if c == 0 && p == 0 || consumed == input.len() {
                        break;
                    }
                }
                Stage::Trailer => {
                    if rest.is_empty() {
                        break;
                    }
                    consumed += self.read_trailer(rest)?;
                }
                Stage::Done => {
                    if !rest.is_empty() {
                        return Err(self.fail(format!(
                            "unexpected extra bytes after end of stream ({} bytes)",
                            rest.len()
                        )));
                    }
                    break;
                }
            }
        }
        Ok((consumed, produced))
    }

    fn name(&self) -> &str {
        NAME
    }
}

/// Parses a gzip member header.
///
/// Returns `Ok(Some(len))` once `buf` holds the complete header, `Ok(None)`
/// while more bytes are needed.
fn parse_header(buf: &[u8]) -> core::result::Result<Option<usize>, String> {
    if buf.len() >= 2 && buf[..2] != MAGIC {
        return Err(format!("bad magic bytes {:02x} {:02x}", buf[0], buf[1]));
    }
    if buf.len() >= 3 && buf[2] != METHOD_DEFLATE {
        return Err(format!("unsupported compression method {}", buf[2]));
    }
    if buf.len() < 10 {
        return Ok(None);
    }
    let flags = buf[3];
    if flags & RESERVED != 0 {
        return Err(format!("reserved header flags set ({flags:#04x})"));
    }
    let mut pos = 10;
    if flags & FEXTRA != 0 {
        let Some(len) = buf.get(pos..pos + 2) else {
            return Ok(None);
        };
        pos += 2 + usize::from(u16::from_le_bytes([len[0], len[1]]));
        if buf.len() < pos {
            return Ok(None);
        }
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            match buf[pos..].iter().position(|&b| b == 0) {
                Some(nul) => pos += nul + 1,
                None => return Ok(None),
            }
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
        if buf.len() < pos {
            return Ok(None);
        }
    }
    Ok((buf.len() >= pos).then_some(pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{DEFAULT_LEVEL, compress, decompress};

    #[test]
    fn header_layout() {
        let packed = compress("gzip", b"hello", DEFAULT_LEVEL).unwrap();
        assert_eq!(&packed[..4], &[0x1F, 0x8B, 8, 0]);
        assert_eq!(packed[9], OS_UNKNOWN);
        let size = &packed[packed.len() - 4..];
        assert_eq!(size, &5u32.to_le_bytes());
    }

    #[test]
    fn optional_header_fields_are_skipped() {
        let body = compress("deflate", b"named member", DEFAULT_LEVEL).unwrap();
        let mut crc = Crc::new();
        crc.update(b"named member");

        let mut member = vec![0x1F, 0x8B, 8, FEXTRA | FNAME | FCOMMENT | FHCRC, 0, 0, 0, 0, 0, 3];
        member.extend_from_slice(&[3, 0, b'x', b'y', b'z']);
        member.extend_from_slice(b"file.txt\0");
        member.extend_from_slice(b"a comment\0");
        member.extend_from_slice(&[0xAA, 0xBB]);
        member.extend_from_slice(&body);
        member.extend_from_slice(&crc.sum().to_le_bytes());
        member.extend_from_slice(&crc.amount().to_le_bytes());

        assert_eq!(decompress("gzip", &member).unwrap(), b"named member");
    }

    #[test]
    fn parse_header_needs_more() {
        assert_eq!(parse_header(&[0x1F, 0x8B, 8]), Ok(None));
        let named = [0x1F, 0x8B, 8, FNAME, 0, 0, 0, 0, 0, 3, b'a', 0];
        assert_eq!(parse_header(&named[..11]), Ok(None));
        assert_eq!(parse_header(&named), Ok(Some(12)));
    }

    #[test]
    fn bad_magic() {
        let err = decompress("gzip", b"PK\x03\x04").unwrap_err();
        assert!(err.to_string().contains("bad magic"), "{err}");
    }

    #[test]
    fn corrupted_crc_is_detected() {
        let mut packed = compress("gzip", b"checksum me", DEFAULT_LEVEL).unwrap();
        let at = packed.len() - 8;
        packed[at] ^= 0xFF;
        let err = decompress("gzip", &packed).unwrap_err();
        assert!(err.to_string().contains("crc32 mismatch"), "{err}");
    }

    #[test]
    fn truncated_trailer_is_detected() {
        let packed = compress("gzip", b"short", DEFAULT_LEVEL).unwrap();
        let err = decompress("gzip", &packed[..packed.len() - 3]).unwrap_err();
        assert!(err.to_string().contains("premature end"), "{err}");
    }

    #[test]
    fn extra_bytes_after_member() {
        let mut packed = compress("gzip", b"one", DEFAULT_LEVEL).unwrap();
        packed.push(0);
        let err = decompress("gzip", &packed).unwrap_err();
        assert!(err.to_string().contains("unexpected extra bytes"), "{err}");
    }
}
