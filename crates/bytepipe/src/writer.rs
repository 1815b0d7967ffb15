use core::fmt;

use crate::{
    buffer::ByteBuffer,
    encoding::{self, Encoding, UTF_8},
    error::Result,
    owner::OwnerThread,
    stream::OutputStream,
};

/// Writes text, raw bytes and fixed-width integers to an [`OutputStream`].
///
/// Text is converted to the writer's encoding before it is written; no
/// byte-order mark is emitted. Integer writers mirror the
/// [`StreamReader`](crate::StreamReader) readers: `write_u32` is big-endian,
/// `write_u32_le` little-endian.
///
/// ```rust
/// use bytepipe::{BinaryOutputStream, StreamWriter, UTF_8};
///
/// let mut w = StreamWriter::new(BinaryOutputStream::new(), &UTF_8);
/// write!(w, "{}-{}", 1, 2).unwrap();
/// w.write_u16_le(0x0102).unwrap();
/// assert_eq!(w.get_ref().as_bytes(), b"1-2\x02\x01");
/// ```
pub struct StreamWriter<S> {
    sink: S,
    encoding: &'static Encoding,
    owner: OwnerThread,
}

macro_rules! int_writers {
    ($($ty:ty => $be:ident, $le:ident;)*) => {
        $(
            #[doc = concat!("Writes a big-endian `", stringify!($ty), "`.")]
            ///
            /// # Errors
            ///
            /// Sink errors.
            pub fn $be(&mut self, value: $ty) -> Result<()> {
                self.write_binary(&value.to_be_bytes())
            }

            #[doc = concat!("Writes a little-endian `", stringify!($ty), "`.")]
            ///
            /// # Errors
            ///
            /// Sink errors.
            pub fn $le(&mut self, value: $ty) -> Result<()> {
                self.write_binary(&value.to_le_bytes())
            }
        )*
    };
}

impl<S: OutputStream> StreamWriter<S> {
    pub fn new(sink: S, encoding: &'static Encoding) -> Self {
        Self {
            sink,
            encoding,
            owner: OwnerThread::current(),
        }
    }

    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    pub fn reassign_thread(&mut self) {
        self.owner.reassign();
    }

    pub fn unassign_thread(&mut self) {
        self.owner.unassign();
    }

    /// Writes `text`, converting it from its own encoding.
    ///
    /// # Errors
    ///
    /// Conversion and sink errors.
    pub fn write_string(&mut self, text: &ByteBuffer) -> Result<()> {
        if text.encoding() == self.encoding {
            return self.write_binary(text.as_bytes());
        }
        let target = self.encoding.without_bom();
        let bytes = encoding::convert(text.as_bytes(), text.encoding(), target)?;
        self.write_binary(&bytes)
    }

    /// Writes UTF-8 text.
    ///
    /// # Errors
    ///
    /// Conversion and sink errors.
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        if self.encoding.is_utf8() {
            return self.write_binary(text.as_bytes());
        }
        let bytes = encoding::convert(text.as_bytes(), &UTF_8, self.encoding.without_bom())?;
        self.write_binary(&bytes)
    }

    /// Writes `text` followed by `\n`.
    ///
    /// # Errors
    ///
    /// Conversion and sink errors.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        self.write_str(text)?;
        let eol = self.encoding.encode_ascii(b"\n");
        self.write_binary(&eol)
    }

    /// Formatted output; lets `write!` target the writer directly.
    ///
    /// # Errors
    ///
    /// Conversion and sink errors.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        match args.as_str() {
            Some(text) => self.write_str(text),
            None => self.write_str(&args.to_string()),
        }
    }

    /// Writes raw bytes unchanged.
    ///
    /// # Errors
    ///
    /// Sink errors, or a state error from another thread.
    pub fn write_binary(&mut self, data: &[u8]) -> Result<()> {
        self.owner.check("stream writer")?;
        self.sink.write(data)
    }

    /// # Errors
    ///
    /// Sink errors.
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_binary(&value.to_be_bytes())
    }

    /// # Errors
    ///
    /// Sink errors.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_binary(&[value])
    }

    int_writers! {
        i16 => write_i16, write_i16_le;
        u16 => write_u16, write_u16_le;
        i32 => write_i32, write_i32_le;
        u32 => write_u32, write_u32_le;
        i64 => write_i64, write_i64_le;
        u64 => write_u64, write_u64_le;
    }

    /// Closes the sink.
    ///
    /// # Errors
    ///
    /// Sink errors.
    pub fn close(&mut self) -> Result<()> {
        self.owner.check("stream writer")?;
        self.sink.close()
    }
}
