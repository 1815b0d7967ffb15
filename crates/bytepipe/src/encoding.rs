//! Registry of named character encodings.
//!
//! An [`Encoding`] is a descriptor: a canonical name, the minimum width of one
//! character in bytes, whether bytes `0..=127` keep their ASCII meaning, and
//! whether a character may span more than one byte. Descriptors also know how
//! to measure characters in a byte slice, which every character-offset
//! operation on [`ByteBuffer`](crate::ByteBuffer) relies on.
//!
//! The UTF family, US-ASCII and ISO-8859-1 are built in. Every other
//! single-byte encoding known to `encoding_rs` (windows-125x, ISO-8859-x,
//! KOI8, ...) is registered lazily on first lookup.

use core::fmt;
use std::sync::LazyLock;

use crate::{
    error::{Result, StreamError},
    transform::{EncodingConvertor, transform_all},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Big,
    Little,
}

/// How bytes of an encoding map to Unicode scalars.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Scheme {
    Utf8,
    /// `bom` is set for the unmarked `UTF-16` name: a BOM is written on
    /// output and honoured on input; big-endian otherwise.
    Utf16 { endian: Endian, bom: bool },
    Ascii,
    Latin1,
    SingleByte(&'static encoding_rs::Encoding),
}

/// Descriptor of a named character encoding.
pub struct Encoding {
    name: &'static str,
    min_width: u8,
    ascii_compatible: bool,
    multibyte: bool,
    pub(crate) scheme: Scheme,
}

/// Result of measuring the character at the start of a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharWidth {
    /// A whole character of this many bytes is available.
    Complete(usize),
    /// The slice ends inside a character (or is empty).
    Incomplete,
    /// The bytes cannot start a character in this encoding.
    Invalid,
}

pub static UTF_8: Encoding = Encoding {
    name: "UTF-8",
    min_width: 1,
    ascii_compatible: true,
    multibyte: true,
    scheme: Scheme::Utf8,
};

pub static UTF_16: Encoding = Encoding {
    name: "UTF-16",
    min_width: 2,
    ascii_compatible: false,
    multibyte: true,
    scheme: Scheme::Utf16 {
        endian: Endian::Big,
        bom: true,
    },
};

pub static UTF_16BE: Encoding = Encoding {
    name: "UTF-16BE",
    min_width: 2,
    ascii_compatible: false,
    multibyte: true,
    scheme: Scheme::Utf16 {
        endian: Endian::Big,
        bom: false,
    },
};

pub static UTF_16LE: Encoding = Encoding {
    name: "UTF-16LE",
    min_width: 2,
    ascii_compatible: false,
    multibyte: true,
    scheme: Scheme::Utf16 {
        endian: Endian::Little,
        bom: false,
    },
};

pub static US_ASCII: Encoding = Encoding {
    name: "US-ASCII",
    min_width: 1,
    ascii_compatible: true,
    multibyte: false,
    scheme: Scheme::Ascii,
};

pub static ISO_8859_1: Encoding = Encoding {
    name: "ISO-8859-1",
    min_width: 1,
    ascii_compatible: true,
    multibyte: false,
    scheme: Scheme::Latin1,
};

static SINGLE_BYTE: LazyLock<Vec<Encoding>> = LazyLock::new(|| {
    [
        encoding_rs::IBM866,
        encoding_rs::ISO_8859_2,
        encoding_rs::ISO_8859_3,
        encoding_rs::ISO_8859_4,
        encoding_rs::ISO_8859_5,
        encoding_rs::ISO_8859_6,
        encoding_rs::ISO_8859_7,
        encoding_rs::ISO_8859_8,
        encoding_rs::ISO_8859_8_I,
        encoding_rs::ISO_8859_10,
        encoding_rs::ISO_8859_13,
        encoding_rs::ISO_8859_14,
        encoding_rs::ISO_8859_15,
        encoding_rs::ISO_8859_16,
        encoding_rs::KOI8_R,
        encoding_rs::KOI8_U,
        encoding_rs::MACINTOSH,
        encoding_rs::WINDOWS_874,
        encoding_rs::WINDOWS_1250,
        encoding_rs::WINDOWS_1251,
        encoding_rs::WINDOWS_1252,
        encoding_rs::WINDOWS_1253,
        encoding_rs::WINDOWS_1254,
        encoding_rs::WINDOWS_1255,
        encoding_rs::WINDOWS_1256,
        encoding_rs::WINDOWS_1257,
        encoding_rs::WINDOWS_1258,
    ]
    .into_iter()
    .map(|enc| Encoding {
        name: enc.name(),
        min_width: 1,
        ascii_compatible: true,
        multibyte: false,
        scheme: Scheme::SingleByte(enc),
    })
    .collect()
});

impl Encoding {
    /// Looks up an encoding by name or alias, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownEncoding`] if the name is not registered.
    pub fn for_name(name: &str) -> Result<&'static Encoding> {
        let upper = name.trim().to_ascii_uppercase();
        let builtin = match upper.as_str() {
            "UTF-8" | "UTF8" => Some(&UTF_8),
            "UTF-16" | "UTF16" | "UCS-2" => Some(&UTF_16),
            "UTF-16BE" | "UTF16BE" | "UCS-2BE" => Some(&UTF_16BE),
            "UTF-16LE" | "UTF16LE" | "UCS-2LE" => Some(&UTF_16LE),
            "US-ASCII" | "ASCII" | "ANSI_X3.4-1968" => Some(&US_ASCII),
            "ISO-8859-1" | "ISO8859-1" | "ISO_8859-1" | "LATIN1" | "LATIN-1" => Some(&ISO_8859_1),
            _ => None,
        };
        if let Some(enc) = builtin {
            return Ok(enc);
        }
        encoding_rs::Encoding::for_label(name.trim().as_bytes())
            .and_then(|rs| {
                SINGLE_BYTE
                    .iter()
                    .find(|e| matches!(e.scheme, Scheme::SingleByte(s) if s == rs))
            })
            .ok_or_else(|| StreamError::UnknownEncoding(name.to_owned()))
    }

    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Minimum number of bytes one character occupies.
    #[must_use]
    pub fn min_char_width(&self) -> usize {
        usize::from(self.min_width)
    }

    /// Whether bytes `0..=127` carry their ASCII meaning, so ASCII delimiters
    /// can be searched for byte-wise.
    #[must_use]
    pub fn is_ascii_compatible(&self) -> bool {
        self.ascii_compatible
    }

    /// Whether one character may take more than one byte.
    #[must_use]
    pub fn is_multibyte(&self) -> bool {
        self.multibyte
    }

    #[must_use]
    pub fn is_utf8(&self) -> bool {
        matches!(self.scheme, Scheme::Utf8)
    }

    /// Measures the character at the start of `bytes`.
    #[must_use]
    pub fn char_width(&self, bytes: &[u8]) -> CharWidth {
        let Some(&lead) = bytes.first() else {
            return CharWidth::Incomplete;
        };
        match self.scheme {
            Scheme::Utf8 => utf8_width(lead, bytes),
            Scheme::Utf16 { endian, .. } => {
                let Some(unit) = read_unit(bytes, endian) else {
                    return CharWidth::Incomplete;
                };
                match unit {
                    0xD800..=0xDBFF => match read_unit(&bytes[2..], endian) {
                        None => CharWidth::Incomplete,
                        Some(0xDC00..=0xDFFF) => CharWidth::Complete(4),
                        Some(_) => CharWidth::Invalid,
                    },
                    0xDC00..=0xDFFF => CharWidth::Invalid,
                    _ => CharWidth::Complete(2),
                }
            }
            Scheme::Ascii if lead >= 0x80 => CharWidth::Invalid,
            Scheme::Ascii | Scheme::Latin1 | Scheme::SingleByte(_) => CharWidth::Complete(1),
        }
    }

    /// Returns the byte length spanned by the first `chars` characters of
    /// `bytes`, or the whole slice when it holds fewer characters.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] if an invalid or truncated
    /// character is met before `chars` characters were counted.
    pub fn byte_len_of_chars(&self, bytes: &[u8], chars: usize) -> Result<usize> {
        if !self.multibyte {
            return Ok(chars.min(bytes.len()));
        }
        let mut pos = 0;
        for _ in 0..chars {
            if pos == bytes.len() {
                break;
            }
            pos += self.complete_width(&bytes[pos..], pos)?;
        }
        Ok(pos)
    }

    /// Counts the characters in `bytes`.
    ///
    /// # Errors
    ///
    /// [`StreamError::EncodingConversion`] on invalid or truncated input.
    pub fn char_count(&self, bytes: &[u8]) -> Result<usize> {
        if !self.multibyte {
            return Ok(bytes.len());
        }
        let mut pos = 0;
        let mut count = 0;
        while pos < bytes.len() {
            pos += self.complete_width(&bytes[pos..], pos)?;
            count += 1;
        }
        Ok(count)
    }

    fn complete_width(&self, bytes: &[u8], offset: usize) -> Result<usize> {
        match self.char_width(bytes) {
            CharWidth::Complete(n) => Ok(n),
            CharWidth::Incomplete => Err(StreamError::conversion(
                self.name,
                self.name,
                format!("truncated character at byte offset {offset}"),
            )),
            CharWidth::Invalid => Err(StreamError::conversion(
                self.name,
                self.name,
                format!("invalid byte sequence at byte offset {offset}"),
            )),
        }
    }

    /// Encodes ASCII text (delimiters, digits) into this encoding. UTF-16
    /// names without an explicit byte order use big-endian and no BOM.
    #[must_use]
    pub fn encode_ascii(&self, ascii: &[u8]) -> Vec<u8> {
        debug_assert!(ascii.is_ascii());
        match self.scheme {
            Scheme::Utf16 { endian, .. } => ascii
                .iter()
                .flat_map(|&b| match endian {
                    Endian::Big => [0, b],
                    Endian::Little => [b, 0],
                })
                .collect(),
            _ => ascii.to_vec(),
        }
    }

    /// The same encoding with byte-order-mark output suppressed, for
    /// converting fragments that are appended to existing text.
    pub(crate) fn without_bom(&'static self) -> &'static Encoding {
        match self.scheme {
            Scheme::Utf16 { bom: true, .. } => &UTF_16BE,
            _ => self,
        }
    }

    /// Returns the ASCII byte a code unit stands for, if it is one.
    pub(crate) fn ascii_unit(&self, unit: &[u8]) -> Option<u8> {
        match (self.scheme, unit) {
            (Scheme::Utf16 { endian, .. }, &[first, second]) => {
                let (high, low) = match endian {
                    Endian::Big => (first, second),
                    Endian::Little => (second, first),
                };
                (high == 0 && low < 0x80).then_some(low)
            }
            (Scheme::Utf16 { .. }, _) => None,
            (_, &[b]) if b < 0x80 => Some(b),
            _ => None,
        }
    }
}

fn utf8_width(lead: u8, bytes: &[u8]) -> CharWidth {
    let width = match lead {
        0x00..=0x7F => return CharWidth::Complete(1),
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return CharWidth::Invalid,
    };
    let available = bytes.len().min(width);
    if bytes[1..available].iter().any(|&b| b & 0xC0 != 0x80) {
        return CharWidth::Invalid;
    }
    if available < width {
        CharWidth::Incomplete
    } else {
        CharWidth::Complete(width)
    }
}

fn read_unit(bytes: &[u8], endian: Endian) -> Option<u16> {
    let pair = [*bytes.first()?, *bytes.get(1)?];
    Some(match endian {
        Endian::Big => u16::from_be_bytes(pair),
        Endian::Little => u16::from_le_bytes(pair),
    })
}

impl PartialEq for Encoding {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Encoding {}

impl fmt::Debug for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Encoding").field(&self.name).finish()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Converts `bytes` from one encoding to another in a single pass.
///
/// # Errors
///
/// [`StreamError::EncodingConversion`] on illegal input sequences or
/// characters the target cannot represent.
pub fn convert(bytes: &[u8], from: &'static Encoding, to: &'static Encoding) -> Result<Vec<u8>> {
    if from == to {
        return Ok(bytes.to_vec());
    }
    let mut convertor = EncodingConvertor::new(from, to);
    transform_all(&mut convertor, bytes)
}
