//! Character-set conversion as a [`Transform`].
//!
//! Conversion runs in two steps through UTF-8: the source decoder fills a
//! UTF-8 staging buffer, the target encoder drains it into an output staging
//! buffer, and that is copied into the caller's destination. All three
//! buffers have a fixed capacity, so a call does bounded work regardless of
//! how much input is offered. Decoders keep partial multi-byte sequences
//! internally, which is what makes arbitrary chunk boundaries safe.

use encoding_rs::{DecoderResult, EncoderResult};
use tracing::{debug, trace};

use super::{STAGING_SIZE, Transform, check_dst, poisoned};
use crate::{
    encoding::{Encoding, Endian, Scheme},
    error::{Result, StreamError},
};

/// Longest UTF-8 sequence or UTF-16 surrogate pair.
const MAX_CHAR_BYTES: usize = 4;

enum Decoder {
    Rs(encoding_rs::Decoder),
    Ascii,
    Latin1,
}

enum Failure {
    Malformed,
    Unmappable(char),
}

impl Decoder {
    fn for_encoding(encoding: &Encoding) -> Self {
        match encoding.scheme {
            Scheme::Utf8 => Self::Rs(encoding_rs::UTF_8.new_decoder_without_bom_handling()),
            Scheme::Utf16 { bom: true, .. } => Self::Rs(encoding_rs::UTF_16BE.new_decoder()),
            Scheme::Utf16 {
                endian: Endian::Big,
                ..
            } => Self::Rs(encoding_rs::UTF_16BE.new_decoder_without_bom_handling()),
            Scheme::Utf16 {
                endian: Endian::Little,
                ..
            } => Self::Rs(encoding_rs::UTF_16LE.new_decoder_without_bom_handling()),
            Scheme::Ascii => Self::Ascii,
            Scheme::Latin1 => Self::Latin1,
            Scheme::SingleByte(enc) => Self::Rs(enc.new_decoder_without_bom_handling()),
        }
    }

    /// Decodes into UTF-8; returns `(read, written)`.
    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        last: bool,
    ) -> core::result::Result<(usize, usize), Failure> {
        match self {
            Self::Rs(decoder) => {
                let (result, read, written) =
                    decoder.decode_to_utf8_without_replacement(src, dst, last);
                match result {
                    DecoderResult::Malformed(_, _) => Err(Failure::Malformed),
                    DecoderResult::InputEmpty | DecoderResult::OutputFull => Ok((read, written)),
                }
            }
            Self::Ascii => {
                let n = src.len().min(dst.len());
                if src[..n].iter().any(|&b| b >= 0x80) {
                    return Err(Failure::Malformed);
                }
                dst[..n].copy_from_slice(&src[..n]);
                Ok((n, n))
            }
            Self::Latin1 => {
                let (mut read, mut written) = (0, 0);
                for &b in src {
                    let ch = char::from(b);
                    let width = ch.len_utf8();
                    if written + width > dst.len() {
                        break;
                    }
                    ch.encode_utf8(&mut dst[written..]);
                    written += width;
                    read += 1;
                }
                Ok((read, written))
            }
        }
    }
}

enum Encoder {
    Rs(encoding_rs::Encoder),
    Utf16 { endian: Endian, bom_pending: bool },
    Ascii,
    Latin1,
}

impl Encoder {
    fn for_encoding(encoding: &Encoding) -> Self {
        match encoding.scheme {
            Scheme::Utf8 => Self::Rs(encoding_rs::UTF_8.new_encoder()),
            Scheme::Utf16 { endian, bom } => Self::Utf16 {
                endian,
                bom_pending: bom,
            },
            Scheme::Ascii => Self::Ascii,
            Scheme::Latin1 => Self::Latin1,
            Scheme::SingleByte(enc) => Self::Rs(enc.new_encoder()),
        }
    }

    /// Encodes UTF-8 text; returns `(read, written)`.
    fn encode(
        &mut self,
        src: &str,
        dst: &mut [u8],
        last: bool,
    ) -> core::result::Result<(usize, usize), Failure> {
        match self {
            Self::Rs(encoder) => {
                let (result, read, written) =
                    encoder.encode_from_utf8_without_replacement(src, dst, last);
                match result {
                    EncoderResult::Unmappable(ch) => Err(Failure::Unmappable(ch)),
                    EncoderResult::InputEmpty | EncoderResult::OutputFull => Ok((read, written)),
                }
            }
            Self::Utf16 {
                endian,
                bom_pending,
            } => {
                let mut written = 0;
                if *bom_pending && !src.is_empty() {
                    if dst.len() < 2 {
                        return Ok((0, 0));
                    }
                    dst[..2].copy_from_slice(&unit_bytes(0xFEFF, *endian));
                    written = 2;
                    *bom_pending = false;
                }
                let mut read = 0;
                for ch in src.chars() {
                    let mut units = [0u16; 2];
                    let units = ch.encode_utf16(&mut units);
                    if written + units.len() * 2 > dst.len() {
                        break;
                    }
                    for &unit in units.iter() {
                        dst[written..written + 2].copy_from_slice(&unit_bytes(unit, *endian));
                        written += 2;
                    }
                    read += ch.len_utf8();
                }
                Ok((read, written))
            }
            Self::Ascii => narrow(src, dst, 0x7F),
            Self::Latin1 => narrow(src, dst, 0xFF),
        }
    }
}

fn unit_bytes(unit: u16, endian: Endian) -> [u8; 2] {
    match endian {
        Endian::Big => unit.to_be_bytes(),
        Endian::Little => unit.to_le_bytes(),
    }
}

/// Encodes into a single-byte repertoire that is a prefix of Unicode.
fn narrow(src: &str, dst: &mut [u8], max: u32) -> core::result::Result<(usize, usize), Failure> {
    let mut written = 0;
    let mut read = 0;
    for ch in src.chars() {
        if written == dst.len() {
            break;
        }
        let Ok(byte) = u8::try_from(u32::from(ch)) else {
            return Err(Failure::Unmappable(ch));
        };
        if u32::from(byte) > max {
            return Err(Failure::Unmappable(ch));
        }
        dst[written] = byte;
        written += 1;
        read += ch.len_utf8();
    }
    Ok((read, written))
}

/// Fixed-capacity byte staging with a read cursor.
struct Stage {
    bytes: Vec<u8>,
    pos: usize,
}

impl Stage {
    fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(STAGING_SIZE),
            pos: 0,
        }
    }

    fn pending(&self) -> &[u8] {
        &self.bytes[self.pos..]
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
        if self.is_empty() {
            self.bytes.clear();
            self.pos = 0;
        }
    }

    /// Moves unread bytes to the front and returns the free tail, resized
    /// to the staging capacity; call [`Self::commit`] with the bytes written.
    fn spare(&mut self) -> (usize, &mut [u8]) {
        if self.pos > 0 {
            self.bytes.drain(..self.pos);
            self.pos = 0;
        }
        let start = self.bytes.len();
        self.bytes.resize(STAGING_SIZE.max(start), 0);
        (start, &mut self.bytes[start..])
    }

    fn commit(&mut self, start: usize, written: usize) {
        self.bytes.truncate(start + written);
    }

    fn room(&self) -> usize {
        STAGING_SIZE - (self.bytes.len() - self.pos)
    }
}

/// Converts a byte stream between two registered encodings.
pub struct EncodingConvertor {
    from: &'static Encoding,
    to: &'static Encoding,
    decoder: Decoder,
    encoder: Encoder,
    input: Stage,
    utf8: Stage,
    output: Stage,
    decoder_finished: bool,
    encoder_finished: bool,
    failed: bool,
}

impl EncodingConvertor {
    #[must_use]
    pub fn new(from: &'static Encoding, to: &'static Encoding) -> Self {
        Self {
            from,
            to,
            decoder: Decoder::for_encoding(from),
            encoder: Encoder::for_encoding(to),
            input: Stage::new(),
            utf8: Stage::new(),
            output: Stage::new(),
            decoder_finished: false,
            encoder_finished: false,
            failed: false,
        }
    }

    /// Looks both encodings up by name.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownEncoding`] for an unregistered name.
    pub fn by_name(from: &str, to: &str) -> Result<Self> {
        Ok(Self::new(Encoding::for_name(from)?, Encoding::for_name(to)?))
    }

    #[must_use]
    pub fn source_encoding(&self) -> &'static Encoding {
        self.from
    }

    #[must_use]
    pub fn target_encoding(&self) -> &'static Encoding {
        self.to
    }

    fn fail(&mut self, failure: &Failure) -> StreamError {
        self.failed = true;
        let detail = match failure {
            Failure::Malformed => format!("illegal byte sequence for {}", self.from.name()),
            Failure::Unmappable(ch) => format!(
                "character {ch:?} (U+{:04X}) cannot be represented in {}",
                u32::from(*ch),
                self.to.name()
            ),
        };
        StreamError::conversion(self.from.name(), self.to.name(), detail)
    }

    /// UTF-8 staging -> output staging.
    fn encode_step(&mut self, flushing: bool) -> Result<bool> {
        if self.encoder_finished || !self.output.is_empty() {
            return Ok(false);
        }
        let last = flushing && self.decoder_finished;
        if self.utf8.is_empty() && !last {
            return Ok(false);
        }
        let text = core::str::from_utf8(self.utf8.pending()).map_err(|e| {
            self.failed = true;
            StreamError::conversion(self.from.name(), self.to.name(), e.to_string())
        })?;
        let mut scratch = [0u8; STAGING_SIZE];
        let encoded = self.encoder.encode(text, &mut scratch, last);
        let (read, written) = encoded.map_err(|f| self.fail(&f))?;
        let (start, spare) = self.output.spare();
        spare[..written].copy_from_slice(&scratch[..written]);
        self.output.commit(start, written);
        self.utf8.consume(read);
        if last && self.utf8.is_empty() {
            self.encoder_finished = true;
            return Ok(true);
        }
        Ok(read > 0 || written > 0)
    }

    /// Input staging -> UTF-8 staging.
    fn decode_step(&mut self, flushing: bool) -> Result<bool> {
        if self.decoder_finished {
            return Ok(false);
        }
        if self.input.is_empty() && !flushing {
            return Ok(false);
        }
        if self.utf8.room() < MAX_CHAR_BYTES {
            return Ok(false);
        }
        let mut scratch = [0u8; STAGING_SIZE];
        let room = self.utf8.room();
        let decoded = self
            .decoder
            .decode(self.input.pending(), &mut scratch[..room], flushing);
        let (read, written) = decoded.map_err(|f| self.fail(&f))?;
        let (start, spare) = self.utf8.spare();
        spare[..written].copy_from_slice(&scratch[..written]);
        self.utf8.commit(start, written);
        self.input.consume(read);
        if flushing && self.input.is_empty() {
            self.decoder_finished = true;
            return Ok(true);
        }
        Ok(read > 0 || written > 0)
    }
}

impl Transform for EncodingConvertor {
    fn apply(&mut self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<(usize, usize)> {
        check_dst(dst)?;
        if self.failed {
            return Err(poisoned(self.name()));
        }
        if self.decoder_finished && src.is_some_and(|s| !s.is_empty()) {
            self.failed = true;
            return Err(StreamError::conversion(
                self.from.name(),
                self.to.name(),
                "input offered after the conversion was finished",
            ));
        }
        let flushing = src.is_none();
        let mut consumed = 0;
        let mut produced = 0;
        loop {
            let mut progress = false;

            let pending = self.output.pending();
            let n = pending.len().min(dst.len() - produced);
            dst[produced..produced + n].copy_from_slice(&pending[..n]);
            self.output.consume(n);
            produced += n;
            progress |= n > 0;
            if produced == dst.len() {
                break;
            }

            progress |= self.encode_step(flushing)?;

            if let Some(src) = src {
                let take = self.input.room().min(src.len() - consumed);
                if take > 0 {
                    let (start, spare) = self.input.spare();
                    spare[..take].copy_from_slice(&src[consumed..consumed + take]);
                    self.input.commit(start, take);
                    consumed += take;
                    progress = true;
                }
            }

            progress |= self.decode_step(flushing)?;

            if !progress {
                break;
            }
        }
        let (from, to) = (self.from.name(), self.to.name());
        trace!(from, to, consumed, produced, "convert");
        if flushing && produced == 0 {
            debug!(from, to, "conversion drained");
        }
        Ok((consumed, produced))
    }

    fn name(&self) -> &str {
        "encoding"
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::QuickCheck;
    use rstest::rstest;

    use super::*;
    use crate::{
        encoding::{ISO_8859_1, US_ASCII, UTF_8, UTF_16, UTF_16BE, UTF_16LE},
        transform::{testing::drive, transform_all},
    };

    fn utf16be(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_be_bytes).collect()
    }

    #[test]
    fn utf8_to_utf16_writes_bom() {
        let mut c = EncodingConvertor::new(&UTF_8, &UTF_16);
        let out = transform_all(&mut c, "hi".as_bytes()).unwrap();
        assert_eq!(out, [0xFE, 0xFF, 0, b'h', 0, b'i']);
    }

    #[test]
    fn utf16_with_le_bom_is_detected() {
        let mut c = EncodingConvertor::new(&UTF_16, &UTF_8);
        let out = transform_all(&mut c, &[0xFF, 0xFE, b'o', 0, b'k', 0]).unwrap();
        assert_eq!(out, b"ok");
    }

    #[rstest]
    #[case(1, 1)]
    #[case(1, 3)]
    #[case(5, 2)]
    #[case(4096, 1)]
    fn split_multibyte_sequences(#[case] src_window: usize, #[case] dst_window: usize) {
        let text = "žluťoučký kůň 😀 úpěl ďábelské ódy ".repeat(300);
        let mut c = EncodingConvertor::new(&UTF_8, &UTF_16LE);
        let wide = drive(&mut c, text.as_bytes(), src_window, dst_window).unwrap();
        let expected: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(wide, expected);

        let mut back = EncodingConvertor::new(&UTF_16LE, &UTF_8);
        let narrow = drive(&mut back, &wide, src_window, dst_window).unwrap();
        assert_eq!(narrow, text.as_bytes());
    }

    #[test]
    fn illegal_sequence_names_encodings() {
        let mut c = EncodingConvertor::new(&UTF_8, &ISO_8859_1);
        let err = transform_all(&mut c, &[b'a', 0xC3, 0x28]).unwrap_err();
        match err {
            StreamError::EncodingConversion { from, to, detail } => {
                assert_eq!(from, "UTF-8");
                assert_eq!(to, "ISO-8859-1");
                assert!(detail.contains("illegal byte sequence"));
            }
            other => panic!("unexpected error {other}"),
        }
        let mut dst = [0u8; 8];
        assert!(matches!(c.apply(None, &mut dst), Err(StreamError::StreamState(_))));
    }

    #[test]
    fn input_after_finish_is_rejected() {
        let mut c = EncodingConvertor::new(&UTF_8, &UTF_16BE);
        assert_eq!(transform_all(&mut c, b"hi").unwrap(), utf16be("hi"));
        let mut dst = [0u8; 8];
        let err = c.apply(Some(b"late"), &mut dst).unwrap_err();
        match err {
            StreamError::EncodingConversion { detail, .. } => {
                assert!(detail.contains("after the conversion"), "{detail}");
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(c.apply(None, &mut dst), Err(StreamError::StreamState(_))));
        let empty = c.apply(Some(b""), &mut dst);
        assert!(matches!(empty, Err(StreamError::StreamState(_))));
    }

    #[test]
    fn truncated_input_fails_on_flush() {
        let mut c = EncodingConvertor::new(&UTF_8, &UTF_16BE);
        let err = transform_all(&mut c, &"€".as_bytes()[..2]).unwrap_err();
        assert!(matches!(err, StreamError::EncodingConversion { .. }));
    }

    #[test]
    fn unmappable_character() {
        let mut c = EncodingConvertor::new(&UTF_8, &US_ASCII);
        let err = transform_all(&mut c, "naïve".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("U+00EF"), "{err}");
    }

    #[test]
    fn single_byte_registry_encoding() {
        let mut c = EncodingConvertor::by_name("windows-1251", "UTF-8").unwrap();
        let out = transform_all(&mut c, &[0xCF, 0xF0, 0xE8]).unwrap();
        assert_eq!(out, "При".as_bytes());
    }

    #[test]
    fn latin1_round_trip_all_bytes() {
        let all: Vec<u8> = (0..=255).collect();
        let mut up = EncodingConvertor::new(&ISO_8859_1, &UTF_16BE);
        let wide = transform_all(&mut up, &all).unwrap();
        let mut down = EncodingConvertor::new(&UTF_16BE, &ISO_8859_1);
        assert_eq!(transform_all(&mut down, &wide).unwrap(), all);
    }

    #[test]
    fn utf8_utf16_round_trip_quickcheck() {
        fn prop(text: String, window: u8) -> bool {
            let window = usize::from(window).max(1);
            let mut there = EncodingConvertor::new(&UTF_8, &UTF_16BE);
            let wide = drive(&mut there, text.as_bytes(), window, window).unwrap();
            if wide != utf16be(&text) {
                return false;
            }
            let mut back = EncodingConvertor::new(&UTF_16BE, &UTF_8);
            drive(&mut back, &wide, window, window).unwrap() == text.as_bytes()
        }

        QuickCheck::new()
            .tests(crate::tests::iterations(300))
            .quickcheck(prop as fn(String, u8) -> bool);
    }
}
