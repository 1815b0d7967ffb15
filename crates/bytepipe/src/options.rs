use crate::error::{Result, StreamError};

/// Configuration for [`StreamReader`](crate::StreamReader).
///
/// # Examples
///
/// ```rust
/// use bytepipe::{BinaryInputStream, ReaderOptions, StreamReader, UTF_8};
///
/// let options = ReaderOptions {
///     buffer_size: 64,
/// };
/// let mut reader =
///     StreamReader::with_options(BinaryInputStream::new(b"a\nb".to_vec()), &UTF_8, options)
///         .unwrap();
/// assert_eq!(reader.read_line(None, true).unwrap().unwrap().as_bytes(), b"a");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReaderOptions {
    /// Size of the look-ahead buffer filled from the underlying stream.
    ///
    /// Lines and strings longer than the buffer are still returned whole;
    /// the buffer only bounds how much is requested per read.
    ///
    /// # Default
    ///
    /// `4096`; values below `16` are rejected.
    pub buffer_size: usize,
}

impl ReaderOptions {
    pub const MIN_BUFFER_SIZE: usize = 16;

    pub(crate) fn validate(self) -> Result<Self> {
        if self.buffer_size < Self::MIN_BUFFER_SIZE {
            return Err(StreamError::invalid(format!(
                "reader buffer size {} is below the minimum of {}",
                self.buffer_size,
                Self::MIN_BUFFER_SIZE
            )));
        }
        Ok(self)
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { buffer_size: 4096 }
    }
}

/// Configuration for [`TransformInputStream`](crate::TransformInputStream)
/// and [`TransformOutputStream`](crate::TransformOutputStream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransformStreamOptions {
    /// Capacity of the staging buffer between the transform and the
    /// wrapped stream.
    ///
    /// # Default
    ///
    /// `4096`; must be at least `1`.
    pub buffer_size: usize,
}

impl TransformStreamOptions {
    pub(crate) fn validate(self) -> Result<Self> {
        if self.buffer_size == 0 {
            return Err(StreamError::invalid("transform stream buffer size must be at least 1"));
        }
        Ok(self)
    }
}

impl Default for TransformStreamOptions {
    fn default() -> Self {
        Self {
            buffer_size: crate::transform::STAGING_SIZE,
        }
    }
}
