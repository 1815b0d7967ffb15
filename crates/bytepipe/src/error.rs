use std::{borrow::Cow, io};

use thiserror::Error;

/// Errors raised by buffers, streams, transforms and readers.
///
/// Every variant is recoverable at the call site that produced it. A
/// [`Transform`](crate::Transform) that returned an error stays unusable
/// afterwards; the pipeline has to be rebuilt.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Illegal byte sequence, unmappable character, or no converter between
    /// the two encodings.
    #[error("cannot convert from {from} to {to}: {detail}")]
    EncodingConversion {
        from: Cow<'static, str>,
        to: Cow<'static, str>,
        detail: String,
    },

    /// The encoding name is not present in the registry.
    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("{algorithm} compression error: {detail}")]
    Compression {
        algorithm: Cow<'static, str>,
        detail: String,
    },

    #[error("{algorithm} decompression error: {detail}")]
    Decompression {
        algorithm: Cow<'static, str>,
        detail: String,
    },

    /// A fixed amount of data was requested but the stream ended first.
    #[error("unexpected end of stream: {requested} bytes requested, only {available} available")]
    EndOfStream { requested: usize, available: usize },

    /// Closed stream, transform reused after failure, or access from a
    /// thread that does not own the object.
    #[error("stream state error: {0}")]
    StreamState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed base64, hex or percent-encoded text.
    #[error("invalid {format} data: {detail}")]
    Format {
        format: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = StreamError> = core::result::Result<T, E>;

impl StreamError {
    pub(crate) fn conversion(
        from: &'static str,
        to: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::EncodingConversion {
            from: Cow::Borrowed(from),
            to: Cow::Borrowed(to),
            detail: detail.into(),
        }
    }

    pub(crate) fn compression(algorithm: &'static str, detail: impl Into<String>) -> Self {
        Self::Compression {
            algorithm: Cow::Borrowed(algorithm),
            detail: detail.into(),
        }
    }

    pub(crate) fn decompression(algorithm: &'static str, detail: impl Into<String>) -> Self {
        Self::Decompression {
            algorithm: Cow::Borrowed(algorithm),
            detail: detail.into(),
        }
    }

    pub(crate) fn state(detail: impl Into<String>) -> Self {
        Self::StreamState(detail.into())
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(inner) => inner,
            StreamError::EndOfStream { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            StreamError::InvalidArgument(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
