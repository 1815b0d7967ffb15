//! Layered byte and character streams.
//!
//! - [`ByteBuffer`]: growable bytes tagged with an [`Encoding`], with
//!   character-offset editing and base64/hex/URL/HTML codecs.
//! - [`InputStream`] / [`OutputStream`]: minimal pull and push contracts with
//!   memory, file, stdio and pipe implementations.
//! - [`Transform`]: bounded-buffer streaming codecs (zlib, raw deflate, gzip,
//!   bzip2, character-set conversion) and the [`TransformInputStream`] /
//!   [`TransformOutputStream`] adapters that plug them into streams.
//! - [`StreamReader`] / [`StreamWriter`]: lines, strings, binary blocks and
//!   fixed-width integers in either byte order.
//!
//! ```rust
//! use bytepipe::{
//!     BinaryInputStream, BinaryOutputStream, CompressionAlgorithm, OutputStream, StreamReader,
//!     TransformInputStream, TransformOutputStream, UTF_8,
//! };
//!
//! let mut packed = TransformOutputStream::new(
//!     BinaryOutputStream::new(),
//!     CompressionAlgorithm::Gzip.compressor(6)?,
//! );
//! packed.write(b"first\r\nsecond\n")?;
//! let packed = packed.into_inner()?.into_bytes();
//!
//! let unpacked = TransformInputStream::new(
//!     BinaryInputStream::new(packed),
//!     CompressionAlgorithm::Gzip.decompressor(),
//! );
//! let mut reader = StreamReader::new(unpacked, &UTF_8);
//! assert_eq!(reader.read_line(None, true)?.unwrap().as_str(), Some("first"));
//! assert_eq!(reader.read_line(None, true)?.unwrap().as_str(), Some("second"));
//! assert!(reader.read_line(None, true)?.is_none());
//! # Ok::<(), bytepipe::StreamError>(())
//! ```

#![allow(missing_docs)]

mod buffer;
mod encoding;
mod error;
mod options;
mod owner;
mod reader;
mod stream;
mod transform;
mod writer;

#[cfg(test)]
mod tests;

pub use buffer::{ByteBuffer, text};
pub use encoding::{
    CharWidth, Encoding, ISO_8859_1, US_ASCII, UTF_8, UTF_16, UTF_16BE, UTF_16LE, convert,
};
pub use error::{Result, StreamError};
pub use options::{ReaderOptions, TransformStreamOptions};
pub use owner::OwnerThread;
pub use reader::{BufferedStreamReader, InputStreamLineIterator, StreamReader};
pub use stream::{
    BinaryInputStream, BinaryOutputStream, ChunkedInputStream, FileInputStream, FileOutputStream,
    InputStream, OutputStream, PipeInputStream, PipeOutputStream, ReadInputStream,
    StderrOutputStream, StdoutOutputStream, StringInputStream, StringOutputStream,
    WriteOutputStream, pipe,
};
#[cfg(any(test, feature = "fuzzing"))]
pub use transform::testing;
pub use transform::{
    CompressionAlgorithm, DEFAULT_LEVEL, EncodingConvertor, Transform, TransformInputStream,
    TransformOutputStream, compress, compressor, decompress, decompressor, transform_all,
};
pub use writer::StreamWriter;
