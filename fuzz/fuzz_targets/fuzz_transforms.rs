#![no_main]

use arbitrary::Arbitrary;
use bytepipe::{
    BinaryInputStream, ChunkedInputStream, CompressionAlgorithm, DEFAULT_LEVEL, Encoding,
    EncodingConvertor, ISO_8859_1, ReaderOptions, StreamReader, US_ASCII, UTF_8, UTF_16, UTF_16BE,
    UTF_16LE, testing::drive,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Algorithm {
    Zlib,
    Deflate,
    Gzip,
    Bzip2,
}

impl From<Algorithm> for CompressionAlgorithm {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Zlib => Self::Zlib,
            Algorithm::Deflate => Self::Deflate,
            Algorithm::Gzip => Self::Gzip,
            Algorithm::Bzip2 => Self::Bzip2,
        }
    }
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Charset {
    Utf8,
    Utf16,
    Utf16Be,
    Utf16Le,
    Ascii,
    Latin1,
}

impl Charset {
    fn encoding(self) -> &'static Encoding {
        match self {
            Self::Utf8 => &UTF_8,
            Self::Utf16 => &UTF_16,
            Self::Utf16Be => &UTF_16BE,
            Self::Utf16Le => &UTF_16LE,
            Self::Ascii => &US_ASCII,
            Self::Latin1 => &ISO_8859_1,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Case {
    /// Arbitrary bytes fed to a decompressor.
    Inflate(Algorithm),
    /// Compress then decompress; must reproduce the input.
    RoundTrip(Algorithm, u8),
    /// Arbitrary bytes through a character-set conversion.
    Convert(Charset, Charset),
    /// Arbitrary bytes split into lines, optionally on a custom delimiter.
    Lines(Charset, Option<String>, bool),
}

#[derive(Debug, Arbitrary)]
struct Input {
    case: Case,
    src_window: u8,
    dst_window: u8,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let src_window = usize::from(input.src_window).max(1);
    let dst_window = usize::from(input.dst_window).max(1);
    match input.case {
        Case::Inflate(alg) => {
            let mut t = CompressionAlgorithm::from(alg).decompressor();
            let _ = drive(&mut t, &input.data, src_window, dst_window);
        }
        Case::RoundTrip(alg, level) => {
            let alg = CompressionAlgorithm::from(alg);
            let level = if level > 9 { DEFAULT_LEVEL } else { i32::from(level) };
            let mut c = alg.compressor(level).unwrap();
            let packed = drive(&mut c, &input.data, src_window, dst_window).unwrap();
            let mut d = alg.decompressor();
            let unpacked = drive(&mut d, &packed, dst_window, src_window).unwrap();
            assert_eq!(unpacked, input.data);
        }
        Case::Convert(from, to) => {
            let mut t = EncodingConvertor::new(from.encoding(), to.encoding());
            let _ = drive(&mut t, &input.data, src_window, dst_window);
        }
        Case::Lines(charset, eol, trim) => {
            let source =
                ChunkedInputStream::new(BinaryInputStream::new(input.data.clone()), src_window)
                    .unwrap();
            let options = ReaderOptions {
                buffer_size: dst_window.max(ReaderOptions::MIN_BUFFER_SIZE),
            };
            let reader = StreamReader::with_options(source, charset.encoding(), options).unwrap();
            let mut total = 0;
            for line in reader.lines(eol.as_deref(), trim) {
                match line {
                    Ok(line) => total += line.len(),
                    Err(_) => return,
                }
            }
            if !trim {
                assert_eq!(total, input.data.len());
            }
        }
    }
});
