//! Growable byte buffer tagged with a character encoding.

pub mod text;

use core::{fmt, ops::Range};
use std::borrow::Cow;

use bstr::ByteSlice;

use crate::{
    encoding::{self, Encoding, UTF_8},
    error::{Result, StreamError},
};

/// Minimum headroom requested on every growth; `Vec::reserve` may double past it.
const GROW_BLOCK: usize = 80;

/// Bytes treated as whitespace by [`ByteBuffer::trim`].
const WHITESPACE: &[u8] = b" \t\n\r\x0B\x0C\0";

/// An owned byte sequence plus the encoding it is declared to be in.
///
/// The encoding is a tag: only the explicit conversion operations
/// ([`convert_encoding`](Self::convert_encoding), and the automatic conversion
/// in [`concat_buffer`](Self::concat_buffer) / [`concat_str`](Self::concat_str))
/// rewrite bytes. Character offsets are used for the `substr`/`splice`
/// family when the encoding is multi-byte; the `_bytes` variants always work
/// on raw offsets.
///
/// Two buffers are equal only if both the bytes and the encoding match.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
    encoding: &'static Encoding,
}

impl ByteBuffer {
    #[must_use]
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            bytes: Vec::new(),
            encoding,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize, encoding: &'static Encoding) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            encoding,
        }
    }

    /// Wraps bytes that are already in `encoding`. Nothing is validated.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, encoding: &'static Encoding) -> Self {
        Self {
            bytes: bytes.into(),
            encoding,
        }
    }

    /// Formats a value (numbers, mostly) as UTF-8 text.
    #[must_use]
    pub fn from_display(value: impl fmt::Display) -> Self {
        Self::from(value.to_string())
    }

    /// Decodes base64 text into a buffer tagged `encoding`.
    ///
    /// # Errors
    ///
    /// [`StreamError::Format`] on malformed input.
    pub fn from_base64(text: &[u8], encoding: &'static Encoding) -> Result<Self> {
        Ok(Self::from_bytes(text::base64_decode(text)?, encoding))
    }

    /// Decodes hex digits into a buffer tagged `encoding`.
    ///
    /// # Errors
    ///
    /// [`StreamError::Format`] on malformed input.
    pub fn from_hex(text: &[u8], encoding: &'static Encoding) -> Result<Self> {
        Ok(Self::from_bytes(text::hex_decode(text)?, encoding))
    }

    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Retags the buffer without touching its bytes.
    ///
    /// This is unchecked: if the bytes are not valid in `encoding`, later
    /// character operations and conversions will fail or misbehave. Use
    /// [`convert_encoding`](Self::convert_encoding) to actually transcode.
    pub fn set_encoding(&mut self, encoding: &'static Encoding) {
        self.encoding = encoding;
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The text as `&str` when the buffer is UTF-8 and valid.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if self.encoding.is_utf8() {
            core::str::from_utf8(&self.bytes).ok()
        } else {
            None
        }
    }

    /// Length in characters.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if the bytes are not valid in the
    /// tagged encoding.
    pub fn char_count(&self) -> Result<usize> {
        self.encoding.char_count(&self.bytes)
    }

    fn reserve_for(&mut self, additional: usize) {
        if self.bytes.capacity() - self.bytes.len() < additional {
            self.bytes.reserve(additional + GROW_BLOCK);
        }
    }

    /// Appends raw bytes, assumed to be in this buffer's encoding.
    pub fn concat(&mut self, bytes: &[u8]) {
        self.reserve_for(bytes.len());
        self.bytes.extend_from_slice(bytes);
    }

    /// Appends UTF-8 text, converting it to this buffer's encoding.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if a character cannot be
    /// represented.
    pub fn concat_str(&mut self, text: &str) -> Result<()> {
        let encoded = self.encode_fragment(text.as_bytes(), &UTF_8)?;
        self.concat(&encoded);
        Ok(())
    }

    /// Appends another buffer, converting it first if its encoding differs.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if the conversion fails; the
    /// buffer is left unchanged.
    pub fn concat_buffer(&mut self, other: &ByteBuffer) -> Result<()> {
        let encoded = self.encode_fragment(&other.bytes, other.encoding)?;
        self.concat(&encoded);
        Ok(())
    }

    fn encode_fragment<'a>(
        &self,
        bytes: &'a [u8],
        from: &'static Encoding,
    ) -> Result<Cow<'a, [u8]>> {
        if from == self.encoding {
            return Ok(Cow::Borrowed(bytes));
        }
        encoding::convert(bytes, from, self.encoding.without_bom()).map(Cow::Owned)
    }

    /// Returns a copy transcoded to `target`. No byte-order mark is written.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] naming both encodings on illegal
    /// input or unmappable characters.
    pub fn convert_encoding(&self, target: &'static Encoding) -> Result<ByteBuffer> {
        if target == self.encoding {
            return Ok(self.clone());
        }
        let bytes = encoding::convert(&self.bytes, self.encoding, target.without_bom())?;
        Ok(Self::from_bytes(bytes, target))
    }

    /// Byte range covered by a character range of this buffer.
    fn char_range(&self, offset: isize, length: Option<isize>) -> Result<Range<usize>> {
        if !self.encoding.is_multibyte() {
            return Ok(normalize_range(self.bytes.len(), offset, length));
        }
        let chars = normalize_range(self.char_count()?, offset, length);
        let start = self.encoding.byte_len_of_chars(&self.bytes, chars.start)?;
        let span = self
            .encoding
            .byte_len_of_chars(&self.bytes[start..], chars.end - chars.start)?;
        Ok(start..start + span)
    }

    /// Characters `offset..offset + length`.
    ///
    /// A negative `offset` counts from the end; a negative `length` leaves
    /// that many characters off the end; `None` takes the rest. Ranges past
    /// the end yield an empty buffer.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if the bytes are not valid in the
    /// tagged encoding.
    pub fn substr(&self, offset: isize, length: Option<isize>) -> Result<ByteBuffer> {
        let range = self.char_range(offset, length)?;
        Ok(Self::from_bytes(&self.bytes[range], self.encoding))
    }

    /// Like [`substr`](Self::substr) with byte offsets.
    #[must_use]
    pub fn substr_bytes(&self, offset: isize, length: Option<isize>) -> ByteBuffer {
        let range = normalize_range(self.bytes.len(), offset, length);
        Self::from_bytes(&self.bytes[range], self.encoding)
    }

    /// Removes characters `offset..offset + length` (same offset rules as
    /// [`substr`](Self::substr)), inserts `replacement` (converted to this
    /// encoding) in their place, and returns what was removed.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] for invalid bytes or a failed
    /// conversion of `replacement`; the buffer is left unchanged.
    pub fn splice(
        &mut self,
        offset: isize,
        length: Option<isize>,
        replacement: Option<&ByteBuffer>,
    ) -> Result<ByteBuffer> {
        let range = self.char_range(offset, length)?;
        let inserted = match replacement {
            Some(r) => self.encode_fragment(&r.bytes, r.encoding)?.into_owned(),
            None => Vec::new(),
        };
        let removed: Vec<u8> = self.bytes.splice(range, inserted).collect();
        Ok(Self::from_bytes(removed, self.encoding))
    }

    /// Like [`splice`](Self::splice) with byte offsets and raw replacement
    /// bytes.
    pub fn splice_bytes(
        &mut self,
        offset: isize,
        length: Option<isize>,
        replacement: &[u8],
    ) -> Vec<u8> {
        let range = normalize_range(self.bytes.len(), offset, length);
        self.reserve_for(replacement.len());
        self.bytes
            .splice(range, replacement.iter().copied())
            .collect()
    }

    /// Unicode scalar value of the character at character `offset`
    /// (negative counts from the end); `None` past the end.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if the character is not valid in
    /// the tagged encoding.
    pub fn unicode_point_at(&self, offset: isize) -> Result<Option<u32>> {
        let range = self.char_range(offset, Some(1))?;
        if range.is_empty() {
            return Ok(None);
        }
        let raw = &self.bytes[range];
        let utf8 = if self.encoding.is_utf8() {
            Cow::Borrowed(raw)
        } else {
            Cow::Owned(encoding::convert(raw, self.encoding.without_bom(), &UTF_8)?)
        };
        let ch = core::str::from_utf8(&utf8)
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| {
                StreamError::conversion(
                    self.encoding.name(),
                    UTF_8.name(),
                    format!("no character at offset {offset}"),
                )
            })?;
        Ok(Some(u32::from(ch)))
    }

    fn encode_needle(&self, needle: &str) -> Result<Vec<u8>> {
        Ok(self
            .encode_fragment(needle.as_bytes(), &UTF_8)?
            .into_owned())
    }

    fn aligned(&self, pos: usize) -> bool {
        pos % self.encoding.min_char_width() == 0
    }

    /// Byte offset of the first occurrence of `needle`, aligned to the
    /// encoding's code unit.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if `needle` cannot be represented.
    pub fn find(&self, needle: &str) -> Result<Option<usize>> {
        let needle = self.encode_needle(needle)?;
        Ok(self.bytes.find_iter(&needle).find(|&p| self.aligned(p)))
    }

    /// Byte offset of the last occurrence of `needle`.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if `needle` cannot be represented.
    pub fn rfind(&self, needle: &str) -> Result<Option<usize>> {
        let needle = self.encode_needle(needle)?;
        Ok(self.bytes.rfind_iter(&needle).find(|&p| self.aligned(p)))
    }

    /// Replaces every non-overlapping occurrence of `from` with `to` and
    /// returns the number of replacements.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidArgument`] for an empty `from`;
    /// [`StreamError::EncodingConversion`] if either string cannot be
    /// represented.
    pub fn replace_all(&mut self, from: &str, to: &str) -> Result<usize> {
        if from.is_empty() {
            return Err(StreamError::invalid("replacement pattern must not be empty"));
        }
        let from = self.encode_needle(from)?;
        let to = self.encode_needle(to)?;
        let mut out = Vec::with_capacity(self.bytes.len());
        let mut count = 0;
        let mut pos = 0;
        while let Some(found) = self.bytes[pos..].find(&from) {
            let at = pos + found;
            if self.aligned(at) {
                out.extend_from_slice(&self.bytes[pos..at]);
                out.extend_from_slice(&to);
                pos = at + from.len();
                count += 1;
            } else {
                out.extend_from_slice(&self.bytes[pos..=at]);
                pos = at + 1;
            }
        }
        out.extend_from_slice(&self.bytes[pos..]);
        self.bytes = out;
        Ok(count)
    }

    fn unit_width(&self) -> usize {
        self.encoding.min_char_width()
    }

    fn last_unit(&self, end: usize) -> Option<u8> {
        let w = self.unit_width();
        if end < w {
            return None;
        }
        self.encoding.ascii_unit(&self.bytes[end - w..end])
    }

    /// Removes one trailing line terminator (`\r\n`, `\n` or `\r`) and
    /// returns the number of bytes removed.
    pub fn chomp(&mut self) -> usize {
        let w = self.unit_width();
        let mut end = self.bytes.len();
        if self.last_unit(end) == Some(b'\n') {
            end -= w;
            if self.last_unit(end) == Some(b'\r') {
                end -= w;
            }
        } else if self.last_unit(end) == Some(b'\r') {
            end -= w;
        }
        let removed = self.bytes.len() - end;
        self.bytes.truncate(end);
        removed
    }

    /// Strips leading and trailing ASCII whitespace and NUL.
    pub fn trim(&mut self) {
        self.trim_end();
        self.trim_start();
    }

    /// Strips trailing ASCII whitespace and NUL. A trailing partial code unit
    /// is left in place along with everything before it.
    pub fn trim_end(&mut self) {
        let w = self.unit_width();
        if self.bytes.len() % w != 0 {
            return;
        }
        let mut end = self.bytes.len();
        while self
            .last_unit(end)
            .is_some_and(|b| WHITESPACE.contains(&b))
        {
            end -= w;
        }
        self.bytes.truncate(end);
    }

    pub fn trim_start(&mut self) {
        let w = self.unit_width();
        let start = self
            .bytes
            .chunks_exact(w)
            .take_while(|unit| {
                self.encoding
                    .ascii_unit(unit)
                    .is_some_and(|b| WHITESPACE.contains(&b))
            })
            .count()
            * w;
        self.bytes.drain(..start);
    }

    fn map_ascii_units(&mut self, map: fn(&mut u8)) {
        let w = self.unit_width();
        let encoding = self.encoding;
        for unit in self.bytes.chunks_exact_mut(w) {
            if encoding.ascii_unit(unit).is_some() {
                let idx = unit.iter().position(|&b| b != 0).unwrap_or(0);
                map(&mut unit[idx]);
            }
        }
    }

    /// Uppercases ASCII letters in place.
    pub fn make_ascii_uppercase(&mut self) {
        self.map_ascii_units(u8::make_ascii_uppercase);
    }

    /// Lowercases ASCII letters in place.
    pub fn make_ascii_lowercase(&mut self) {
        self.map_ascii_units(u8::make_ascii_lowercase);
    }

    /// Moves the contents out, leaving an empty buffer with the same
    /// encoding.
    pub fn take(&mut self) -> ByteBuffer {
        Self::from_bytes(core::mem::take(&mut self.bytes), self.encoding)
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Base64 of the raw bytes; see [`text::base64_encode`] for
    /// `max_line_len`.
    #[must_use]
    pub fn to_base64(&self, max_line_len: usize) -> String {
        text::base64_encode(&self.bytes, max_line_len)
    }

    #[must_use]
    pub fn to_base64_url(&self) -> String {
        text::base64_url_encode(&self.bytes)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        text::hex_encode(&self.bytes)
    }

    /// Percent-encodes the UTF-8 form of the text.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if the bytes are invalid.
    pub fn url_encode(&self) -> Result<String> {
        Ok(text::url_encode(self.convert_encoding(&UTF_8)?.as_bytes()))
    }

    /// Escapes markup characters, keeping this buffer's encoding.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if the bytes are invalid.
    pub fn html_encode(&self) -> Result<ByteBuffer> {
        self.map_text(text::html_encode)
    }

    /// Resolves character references, keeping this buffer's encoding.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if the bytes are invalid or a
    /// decoded character cannot be represented.
    pub fn html_decode(&self) -> Result<ByteBuffer> {
        self.map_text(text::html_decode)
    }

    fn map_text(&self, f: fn(&str) -> String) -> Result<ByteBuffer> {
        let utf8 = self.convert_encoding(&UTF_8)?;
        let text = core::str::from_utf8(&utf8.bytes).map_err(|e| {
            StreamError::conversion(self.encoding.name(), UTF_8.name(), e.to_string())
        })?;
        ByteBuffer::from(f(text)).convert_encoding(self.encoding)
    }
}

/// Resolves `offset`/`length` against a sequence of `len` items.
fn normalize_range(len: usize, offset: isize, length: Option<isize>) -> Range<usize> {
    let start = if offset < 0 {
        len.saturating_sub(offset.unsigned_abs())
    } else {
        offset.unsigned_abs().min(len)
    };
    let end = match length {
        None => len,
        Some(n) if n < 0 => len.saturating_sub(n.unsigned_abs()).max(start),
        Some(n) => start.saturating_add(n.unsigned_abs()).min(len),
    };
    start..end
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new(&UTF_8)
    }
}

impl From<&str> for ByteBuffer {
    fn from(text: &str) -> Self {
        Self::from_bytes(text.as_bytes(), &UTF_8)
    }
}

impl From<String> for ByteBuffer {
    fn from(text: String) -> Self {
        Self::from_bytes(text.into_bytes(), &UTF_8)
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Write for ByteBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.concat_str(s).map_err(|_| fmt::Error)
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("encoding", &self.encoding.name())
            .field("bytes", &self.bytes.as_bstr())
            .finish()
    }
}

/// Shows the text decoded from its encoding; undecodable bytes are
/// replaced with U+FFFD.
impl fmt::Display for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.encoding.is_utf8() {
            return fmt::Display::fmt(self.bytes.as_bstr(), f);
        }
        match encoding::convert(&self.bytes, self.encoding.without_bom(), &UTF_8) {
            Ok(utf8) => fmt::Display::fmt(utf8.as_bstr(), f),
            Err(_) => fmt::Display::fmt(self.bytes.as_bstr(), f),
        }
    }
}
