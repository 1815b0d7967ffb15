//! Line, string, binary and fixed-width integer reading on top of an
//! [`InputStream`].

mod eol;

use bstr::ByteSlice;
use tracing::trace;

use self::eol::EolMatcher;
use crate::{
    buffer::ByteBuffer,
    encoding::{self, CharWidth, Encoding, UTF_8},
    error::{Result, StreamError},
    options::ReaderOptions,
    owner::OwnerThread,
    stream::InputStream,
};

/// Buffered reader that decodes records from an [`InputStream`].
///
/// The look-ahead buffer has a fixed capacity. Unconsumed bytes are moved to
/// its front before every refill, so memory stays bounded no matter how much
/// is read; only the record being assembled (a long line, a large
/// [`read_binary`](Self::read_binary)) grows separately.
///
/// Integer readers come in big-endian form (`read_u32`) and little-endian
/// form (`read_u32_le`). They either return a whole value or fail with
/// [`StreamError::EndOfStream`] without consuming anything.
pub struct StreamReader<S> {
    source: S,
    encoding: &'static Encoding,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
    owner: OwnerThread,
}

/// [`StreamReader`] with an explicitly sized buffer; both names refer to the
/// same buffered implementation.
pub type BufferedStreamReader<S> = StreamReader<S>;

macro_rules! int_readers {
    ($($ty:ty => $be:ident, $le:ident;)*) => {
        $(
            #[doc = concat!("Reads a big-endian `", stringify!($ty), "`.")]
            ///
            /// # Errors
            ///
            /// [`StreamError::EndOfStream`] if fewer bytes remain.
            pub fn $be(&mut self) -> Result<$ty> {
                Ok(<$ty>::from_be_bytes(self.take_exact()?))
            }

            #[doc = concat!("Reads a little-endian `", stringify!($ty), "`.")]
            ///
            /// # Errors
            ///
            /// [`StreamError::EndOfStream`] if fewer bytes remain.
            pub fn $le(&mut self) -> Result<$ty> {
                Ok(<$ty>::from_le_bytes(self.take_exact()?))
            }
        )*
    };
}

impl<S: InputStream> StreamReader<S> {
    /// A reader with the default buffer size.
    pub fn new(source: S, encoding: &'static Encoding) -> Self {
        Self::build(source, encoding, ReaderOptions::default())
    }

    /// # Errors
    ///
    /// [`StreamError::InvalidArgument`] if the buffer size is below
    /// [`ReaderOptions::MIN_BUFFER_SIZE`].
    pub fn with_options(
        source: S,
        encoding: &'static Encoding,
        options: ReaderOptions,
    ) -> Result<Self> {
        Ok(Self::build(source, encoding, options.validate()?))
    }

    fn build(source: S, encoding: &'static Encoding, options: ReaderOptions) -> Self {
        Self {
            source,
            encoding,
            buf: vec![0; options.buffer_size].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
            owner: OwnerThread::current(),
        }
    }

    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Bytes read from the source but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    /// Returns the source. Buffered bytes are discarded.
    pub fn into_inner(self) -> S {
        self.source
    }

    pub fn reassign_thread(&mut self) {
        self.owner.reassign();
    }

    pub fn unassign_thread(&mut self) {
        self.owner.unassign();
    }

    fn check_owner(&mut self) -> Result<()> {
        self.owner.check("stream reader")
    }

    fn available(&self) -> usize {
        self.end - self.start
    }

    /// Compacts the buffer and reads once into its free tail.
    fn fill(&mut self) -> Result<usize> {
        if self.eof {
            return Ok(0);
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end == self.buf.len() {
            return Ok(0);
        }
        let n = self.source.read(&mut self.buf[self.end..])?;
        trace!(n, buffered = self.end + n, "reader refill");
        if n == 0 {
            self.eof = true;
        }
        self.end += n;
        Ok(n)
    }

    /// Fills until `n` bytes are buffered or the source ends.
    fn ensure(&mut self, n: usize) -> Result<bool> {
        while self.available() < n && !self.eof {
            if self.fill()? == 0 && !self.eof {
                break;
            }
        }
        Ok(self.available() >= n)
    }

    fn take_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.check_owner()?;
        if !self.ensure(N)? {
            return Err(StreamError::EndOfStream {
                requested: N,
                available: self.available(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.start..self.start + N]);
        self.start += N;
        Ok(out)
    }

    fn unit_at_start(&self) -> Option<u8> {
        let w = self.encoding.min_char_width();
        self.buf
            .get(self.start..self.start + w)
            .and_then(|unit| self.encoding.ascii_unit(unit))
    }

    /// Reads one line.
    ///
    /// Without `eol`, any of `\n`, `\r\n` or `\r` ends a line; a `\r` at
    /// the end of the buffered data is only classified once the next unit
    /// (or end of stream) is known. With `eol`, the delimiter is matched
    /// literally after conversion to the reader's encoding and may straddle
    /// refills. `trim` drops the terminator from the result.
    ///
    /// Returns `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidArgument`] for an empty `eol`, conversion errors
    /// if `eol` cannot be represented, and source errors.
    pub fn read_line(&mut self, eol: Option<&str>, trim: bool) -> Result<Option<ByteBuffer>> {
        self.check_owner()?;
        let line = match eol {
            None => self.read_line_auto(trim)?,
            Some("") => return Err(StreamError::invalid("end-of-line marker must not be empty")),
            Some(eol) => {
                let target = self.encoding.without_bom();
                let pattern = encoding::convert(eol.as_bytes(), &UTF_8, target)?;
                let mut matcher = EolMatcher::new(pattern, self.encoding.min_char_width());
                self.read_line_with(&mut matcher, trim)?
            }
        };
        Ok(line.map(|bytes| ByteBuffer::from_bytes(bytes, self.encoding)))
    }

    fn read_line_auto(&mut self, trim: bool) -> Result<Option<Vec<u8>>> {
        let w = self.encoding.min_char_width();
        let mut line = Vec::new();
        let mut got_data = false;
        loop {
            if self.available() < w {
                if self.fill()? == 0 && self.eof {
                    // a trailing partial unit still belongs to the line
                    got_data |= self.available() > 0;
                    line.extend_from_slice(self.buffered());
                    self.start = self.end;
                    break;
                }
                continue;
            }
            got_data = true;
            let avail = self.buffered();
            let whole = avail.len() - avail.len() % w;
            let hit = if w == 1 {
                avail.find_byteset(b"\r\n")
            } else {
                avail[..whole]
                    .chunks_exact(w)
                    .position(|unit| matches!(self.encoding.ascii_unit(unit), Some(b'\r' | b'\n')))
                    .map(|i| i * w)
            };
            let Some(at) = hit else {
                line.extend_from_slice(&avail[..whole]);
                self.start += whole;
                continue;
            };
            line.extend_from_slice(&avail[..at]);
            self.start += at;
            let terminator = self.unit_at_start();
            if !trim {
                line.extend_from_slice(&self.buf[self.start..self.start + w]);
            }
            self.start += w;
            if terminator == Some(b'\r') && self.ensure(w)? && self.unit_at_start() == Some(b'\n') {
                if !trim {
                    line.extend_from_slice(&self.buf[self.start..self.start + w]);
                }
                self.start += w;
            }
            return Ok(Some(line));
        }
        Ok(got_data.then_some(line))
    }

    fn read_line_with(&mut self, matcher: &mut EolMatcher, trim: bool) -> Result<Option<Vec<u8>>> {
        matcher.reset();
        let mut line = Vec::new();
        let mut got_data = false;
        loop {
            if self.available() == 0 {
                if self.fill()? == 0 && self.eof {
                    break;
                }
                continue;
            }
            got_data = true;
            let avail = &self.buf[self.start..self.end];
            match avail.iter().position(|&b| matcher.feed(b)) {
                Some(i) => {
                    line.extend_from_slice(&avail[..=i]);
                    self.start += i + 1;
                    if trim {
                        line.truncate(line.len() - matcher.len());
                    }
                    return Ok(Some(line));
                }
                None => {
                    line.extend_from_slice(avail);
                    self.start = self.end;
                }
            }
        }
        Ok(got_data.then_some(line))
    }

    /// Reads up to `limit` bytes, blocking until that many arrive or the
    /// stream ends. A negative `limit` reads everything that is left.
    ///
    /// Returns `None` for `limit == 0` (without touching the source) or
    /// when nothing is left.
    ///
    /// # Errors
    ///
    /// Source errors.
    pub fn read_binary(&mut self, limit: i64) -> Result<Option<Vec<u8>>> {
        self.check_owner()?;
        if limit == 0 {
            return Ok(None);
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut out = Vec::new();
        while out.len() < limit {
            if self.available() == 0 && (self.eof || self.fill()? == 0) {
                break;
            }
            let n = self.available().min(limit - out.len());
            out.extend_from_slice(&self.buf[self.start..self.start + n]);
            self.start += n;
        }
        Ok((!out.is_empty()).then_some(out))
    }

    /// Reads up to `limit` characters (everything if negative) as text in
    /// the reader's encoding. Returns `None` for `limit == 0` or at end of
    /// stream.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] for bytes that are invalid in the
    /// reader's encoding, including a character cut off by end of stream.
    pub fn read_string(&mut self, limit: i64) -> Result<Option<ByteBuffer>> {
        self.check_owner()?;
        if limit == 0 {
            return Ok(None);
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut out = Vec::new();
        let mut chars = 0;
        while chars < limit {
            match self.encoding.char_width(self.buffered()) {
                CharWidth::Complete(n) => {
                    out.extend_from_slice(&self.buf[self.start..self.start + n]);
                    self.start += n;
                    chars += 1;
                }
                CharWidth::Incomplete => {
                    if self.fill()? == 0 && self.eof {
                        if self.available() > 0 {
                            return Err(self.invalid_text("truncated character at end of stream"));
                        }
                        break;
                    }
                }
                CharWidth::Invalid => {
                    return Err(self.invalid_text("invalid byte sequence"));
                }
            }
        }
        Ok((!out.is_empty()).then(|| ByteBuffer::from_bytes(out, self.encoding)))
    }

    fn invalid_text(&self, detail: &str) -> StreamError {
        StreamError::conversion(self.encoding.name(), self.encoding.name(), detail)
    }

    /// # Errors
    ///
    /// [`StreamError::EndOfStream`] at end of stream.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.take_exact()?))
    }

    /// # Errors
    ///
    /// [`StreamError::EndOfStream`] at end of stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(u8::from_be_bytes(self.take_exact()?))
    }

    int_readers! {
        i16 => read_i16, read_i16_le;
        u16 => read_u16, read_u16_le;
        i32 => read_i32, read_i32_le;
        u32 => read_u32, read_u32_le;
        i64 => read_i64, read_i64_le;
        u64 => read_u64, read_u64_le;
    }

    /// Iterates over lines; see [`read_line`](Self::read_line).
    pub fn lines(self, eol: Option<&str>, trim: bool) -> InputStreamLineIterator<S> {
        InputStreamLineIterator::from_reader(self, eol, trim)
    }
}

/// Iterator over the lines of an [`InputStream`], counting them.
///
/// Stops after the first error.
pub struct InputStreamLineIterator<S> {
    reader: StreamReader<S>,
    eol: Option<String>,
    trim: bool,
    line_number: u64,
    failed: bool,
}

impl<S: InputStream> InputStreamLineIterator<S> {
    pub fn new(source: S, encoding: &'static Encoding, eol: Option<&str>, trim: bool) -> Self {
        Self::from_reader(StreamReader::new(source, encoding), eol, trim)
    }

    pub fn from_reader(reader: StreamReader<S>, eol: Option<&str>, trim: bool) -> Self {
        Self {
            reader,
            eol: eol.map(str::to_owned),
            trim,
            line_number: 0,
            failed: false,
        }
    }

    /// 1-based number of the line most recently returned; 0 before the
    /// first.
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn reader(&mut self) -> &mut StreamReader<S> {
        &mut self.reader
    }

    pub fn into_reader(self) -> StreamReader<S> {
        self.reader
    }
}

impl<S: InputStream> Iterator for InputStreamLineIterator<S> {
    type Item = Result<ByteBuffer>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.read_line(self.eol.as_deref(), self.trim) {
            Ok(Some(line)) => {
                self.line_number += 1;
                Some(Ok(line))
            }
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        encoding::{ISO_8859_1, UTF_16BE, UTF_16LE},
        stream::{BinaryInputStream, ChunkedInputStream},
    };

    fn reader(data: &[u8], chunk: usize) -> StreamReader<ChunkedInputStream<BinaryInputStream>> {
        let source = ChunkedInputStream::new(BinaryInputStream::new(data.to_vec()), chunk).unwrap();
        StreamReader::with_options(source, &UTF_8, ReaderOptions { buffer_size: 16 }).unwrap()
    }

    fn lines<S: InputStream>(
        r: &mut StreamReader<S>,
        eol: Option<&str>,
        trim: bool,
    ) -> Vec<String> {
        core::iter::from_fn(|| r.read_line(eol, trim).unwrap())
            .map(|line| line.to_string())
            .collect()
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(64)]
    fn auto_detects_every_terminator(#[case] chunk: usize) {
        let mut r = reader(b"a\r\nb\nc\rd", chunk);
        assert_eq!(lines(&mut r, None, true), ["a", "b", "c", "d"]);
        let mut r = reader(b"a\r\nb\nc\rd", chunk);
        assert_eq!(lines(&mut r, None, false), ["a\r\n", "b\n", "c\r", "d"]);
    }

    #[test]
    fn lone_cr_at_end_of_stream_terminates() {
        let mut r = reader(b"x\r", 1);
        assert_eq!(lines(&mut r, None, false), ["x\r"]);
    }

    #[test]
    fn empty_lines_are_kept() {
        let mut r = reader(b"\n\r\n\nz", 3);
        assert_eq!(lines(&mut r, None, true), ["", "", "", "z"]);
        assert!(r.read_line(None, true).unwrap().is_none());
    }

    #[test]
    fn explicit_delimiter_spans_refills() {
        let mut r = reader(b"one<<>>two<<<>>three<<>", 1);
        assert_eq!(
            lines(&mut r, Some("<<>>"), true),
            ["one", "two<", "three<<>"]
        );
        let mut r = reader(b"one<<>>two", 1);
        assert_eq!(lines(&mut r, Some("<<>>"), false), ["one<<>>", "two"]);
        assert!(r.read_line(Some(""), true).is_err());
    }

    #[test]
    fn lines_longer_than_the_buffer() {
        let long = "x".repeat(100);
        let text = format!("{long}\n{long}");
        let mut r = reader(text.as_bytes(), 7);
        assert_eq!(lines(&mut r, None, true), [long.clone(), long]);
    }

    #[rstest]
    #[case(&UTF_16LE)]
    #[case(&UTF_16BE)]
    fn utf16_lines(#[case] enc: &'static Encoding) {
        let text = ByteBuffer::from("ĀĊ\r\nč\rd\n");
        let wide = text.convert_encoding(enc).unwrap();
        let source = ChunkedInputStream::new(BinaryInputStream::new(wide.into_bytes()), 1).unwrap();
        let mut r = StreamReader::new(source, enc);
        assert_eq!(lines(&mut r, None, true), ["ĀĊ", "č", "d"]);
    }

    #[test]
    fn utf16_explicit_delimiter_is_encoded() {
        let text = ByteBuffer::from("a||b");
        let wide = text.convert_encoding(&UTF_16LE).unwrap();
        let mut r = StreamReader::new(BinaryInputStream::new(wide.into_bytes()), &UTF_16LE);
        assert_eq!(lines(&mut r, Some("||"), true), ["a", "b"]);
    }

    #[test]
    fn integers_in_both_byte_orders() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-1i32).to_be_bytes());
        data.extend_from_slice(&0x0102_0304u32.to_le_bytes());
        data.extend_from_slice(&(-2i64).to_be_bytes());
        data.extend_from_slice(&0xBEEFu16.to_le_bytes());
        data.extend_from_slice(&[0xFF, 0x80]);
        let mut r = reader(&data, 3);
        assert_eq!(r.read_i32().unwrap(), -1);
        assert_eq!(r.read_u32_le().unwrap(), 0x0102_0304);
        assert_eq!(r.read_i64().unwrap(), -2);
        assert_eq!(r.read_u16_le().unwrap(), 0xBEEF);
        assert_eq!(r.read_u8().unwrap(), 0xFF);
        assert_eq!(r.read_i8().unwrap(), -128);
        assert!(matches!(
            r.read_u8(),
            Err(StreamError::EndOfStream {
                requested: 1,
                available: 0,
            })
        ));
    }

    #[test]
    fn short_integer_is_not_consumed() {
        let mut r = reader(b"abc", 1);
        let err = r.read_i64().unwrap_err();
        assert!(matches!(
            err,
            StreamError::EndOfStream {
                requested: 8,
                available: 3,
            }
        ));
        assert_eq!(
            err.to_string(),
            "unexpected end of stream: 8 bytes requested, only 3 available"
        );
        assert_eq!(r.read_binary(-1).unwrap().unwrap(), b"abc");
    }

    #[test]
    fn read_binary_limits() {
        let mut r = reader(b"0123456789", 4);
        assert!(r.read_binary(0).unwrap().is_none());
        assert!(r.buffered().is_empty());
        assert_eq!(r.read_binary(3).unwrap().unwrap(), b"012");
        assert_eq!(r.read_binary(-1).unwrap().unwrap(), b"3456789");
        assert!(r.read_binary(5).unwrap().is_none());
    }

    #[test]
    fn read_string_counts_characters() {
        let mut r = reader("añ€😀z".as_bytes(), 1);
        assert_eq!(r.read_string(3).unwrap().unwrap().as_str(), Some("añ€"));
        assert_eq!(r.read_string(-1).unwrap().unwrap().as_str(), Some("😀z"));
        assert!(r.read_string(1).unwrap().is_none());

        let mut cut = reader(&"€".as_bytes()[..2], 1);
        assert!(matches!(
            cut.read_string(1),
            Err(StreamError::EncodingConversion { .. })
        ));

        let mut latin = StreamReader::new(BinaryInputStream::new(vec![0xE9, b'!']), &ISO_8859_1);
        assert_eq!(latin.read_string(1).unwrap().unwrap().to_string(), "é");
    }

    #[test]
    fn iterator_counts_lines_and_fuses_on_error() {
        let source = BinaryInputStream::new(b"a\nb\n".to_vec());
        let mut it = InputStreamLineIterator::new(source, &UTF_8, None, true);
        assert_eq!(it.line_number(), 0);
        assert_eq!(it.next().unwrap().unwrap().as_str(), Some("a"));
        assert_eq!(it.next().unwrap().unwrap().as_str(), Some("b"));
        assert_eq!(it.line_number(), 2);
        assert!(it.next().is_none());

        let source = BinaryInputStream::new(b"a".to_vec());
        let mut bad = InputStreamLineIterator::new(source, &UTF_8, Some(""), true);
        assert!(bad.next().unwrap().is_err());
        assert!(bad.next().is_none());
    }

    #[test]
    fn buffer_size_is_validated() {
        let source = BinaryInputStream::default();
        let options = ReaderOptions { buffer_size: 8 };
        assert!(StreamReader::with_options(source, &UTF_8, options).is_err());
    }
}
