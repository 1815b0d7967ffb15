//! Byte-oriented text codecs: base64, hex, URL percent-encoding and HTML
//! entities.
//!
//! The URL and HTML helpers are driven by immutable tables built once per
//! process and shared freely between threads.

use std::{collections::HashMap, sync::LazyLock};

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose},
};

use crate::error::{Result, StreamError};

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(true)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

static STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
static URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

fn format_error(format: &'static str, detail: impl Into<String>) -> StreamError {
    StreamError::Format {
        format,
        detail: detail.into(),
    }
}

/// Base64-encodes `data` with padding. When `max_line_len` is non-zero the
/// output is broken into lines of at most that many characters joined by
/// CRLF.
#[must_use]
pub fn base64_encode(data: &[u8], max_line_len: usize) -> String {
    let encoded = general_purpose::STANDARD.encode(data);
    if max_line_len == 0 || encoded.len() <= max_line_len {
        return encoded;
    }
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / max_line_len * 2);
    for (i, line) in encoded.as_bytes().chunks(max_line_len).enumerate() {
        if i > 0 {
            wrapped.push_str("\r\n");
        }
        // base64 output is ASCII, so every chunk boundary is a char boundary
        wrapped.extend(line.iter().map(|&b| char::from(b)));
    }
    wrapped
}

/// Base64url-encodes `data` without padding.
#[must_use]
pub fn base64_url_encode(data: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Decodes standard or URL-safe base64. ASCII whitespace (including line
/// breaks) is skipped and padding is optional.
///
/// # Errors
///
/// [`StreamError::Format`] for characters outside the alphabet or an
/// impossible length.
pub fn base64_decode(text: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let engine = if compact.iter().any(|&b| b == b'-' || b == b'_') {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };
    engine
        .decode(&compact)
        .map_err(|e| format_error("base64", e.to_string()))
}

/// Lowercase hex.
#[must_use]
pub fn hex_encode(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decodes hex digits of either case; ASCII whitespace is skipped.
///
/// # Errors
///
/// [`StreamError::Format`] for a non-hex digit or an odd digit count.
pub fn hex_decode(text: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    hex::decode(compact).map_err(|e| format_error("hex", e.to_string()))
}

/// Bytes left alone by [`url_encode`]: the RFC 3986 unreserved set.
#[allow(clippy::cast_possible_truncation)]
static URL_UNRESERVED: [bool; 256] = {
    let mut table = [false; 256];
    let mut b = 0;
    while b < 256 {
        let c = b as u8;
        table[b] = c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.' | b'~');
        b += 1;
    }
    table
};

/// Percent-encodes every byte outside the unreserved set.
#[must_use]
pub fn url_encode(data: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if URL_UNRESERVED[usize::from(b)] {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push(char::from(DIGITS[usize::from(b >> 4)]));
            out.push(char::from(DIGITS[usize::from(b & 0xF)]));
        }
    }
    out
}

/// Decodes `%XX` escapes. `+` is kept literally; form encoding is not
/// assumed.
///
/// # Errors
///
/// [`StreamError::Format`] for a `%` not followed by two hex digits.
pub fn url_decode(text: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if text[i] == b'%' {
            let digits = text.get(i + 1..i + 3).ok_or_else(|| {
                format_error("url", format!("truncated escape at byte offset {i}"))
            })?;
            let [hi, lo] = [digits[0], digits[1]].map(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                _ => {
                    return Err(format_error("url", format!("invalid escape at byte offset {i}")));
                }
            }
            i += 3;
        } else {
            out.push(text[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn hex_value(b: u8) -> Option<u8> {
    char::from(b)
        .to_digit(16)
        .and_then(|d| u8::try_from(d).ok())
}

/// Named entities understood by [`html_decode`].
static HTML_ENTITIES: LazyLock<HashMap<&'static str, char>> = LazyLock::new(|| {
    [
        ("amp", '&'),
        ("lt", '<'),
        ("gt", '>'),
        ("quot", '"'),
        ("apos", '\''),
        ("nbsp", '\u{A0}'),
        ("iexcl", '¡'),
        ("cent", '¢'),
        ("pound", '£'),
        ("curren", '¤'),
        ("yen", '¥'),
        ("brvbar", '¦'),
        ("sect", '§'),
        ("uml", '¨'),
        ("copy", '©'),
        ("ordf", 'ª'),
        ("laquo", '«'),
        ("not", '¬'),
        ("shy", '\u{AD}'),
        ("reg", '®'),
        ("macr", '¯'),
        ("deg", '°'),
        ("plusmn", '±'),
        ("sup2", '²'),
        ("sup3", '³'),
        ("acute", '´'),
        ("micro", 'µ'),
        ("para", '¶'),
        ("middot", '·'),
        ("cedil", '¸'),
        ("sup1", '¹'),
        ("ordm", 'º'),
        ("raquo", '»'),
        ("frac14", '¼'),
        ("frac12", '½'),
        ("frac34", '¾'),
        ("iquest", '¿'),
        ("Agrave", 'À'),
        ("Aacute", 'Á'),
        ("Acirc", 'Â'),
        ("Atilde", 'Ã'),
        ("Auml", 'Ä'),
        ("Aring", 'Å'),
        ("AElig", 'Æ'),
        ("Ccedil", 'Ç'),
        ("Egrave", 'È'),
        ("Eacute", 'É'),
        ("Ecirc", 'Ê'),
        ("Euml", 'Ë'),
        ("Igrave", 'Ì'),
        ("Iacute", 'Í'),
        ("Icirc", 'Î'),
        ("Iuml", 'Ï'),
        ("ETH", 'Ð'),
        ("Ntilde", 'Ñ'),
        ("Ograve", 'Ò'),
        ("Oacute", 'Ó'),
        ("Ocirc", 'Ô'),
        ("Otilde", 'Õ'),
        ("Ouml", 'Ö'),
        ("times", '×'),
        ("Oslash", 'Ø'),
        ("Ugrave", 'Ù'),
        ("Uacute", 'Ú'),
        ("Ucirc", 'Û'),
        ("Uuml", 'Ü'),
        ("Yacute", 'Ý'),
        ("THORN", 'Þ'),
        ("szlig", 'ß'),
        ("agrave", 'à'),
        ("aacute", 'á'),
        ("acirc", 'â'),
        ("atilde", 'ã'),
        ("auml", 'ä'),
        ("aring", 'å'),
        ("aelig", 'æ'),
        ("ccedil", 'ç'),
        ("egrave", 'è'),
        ("eacute", 'é'),
        ("ecirc", 'ê'),
        ("euml", 'ë'),
        ("igrave", 'ì'),
        ("iacute", 'í'),
        ("icirc", 'î'),
        ("iuml", 'ï'),
        ("eth", 'ð'),
        ("ntilde", 'ñ'),
        ("ograve", 'ò'),
        ("oacute", 'ó'),
        ("ocirc", 'ô'),
        ("otilde", 'õ'),
        ("ouml", 'ö'),
        ("divide", '÷'),
        ("oslash", 'ø'),
        ("ugrave", 'ù'),
        ("uacute", 'ú'),
        ("ucirc", 'û'),
        ("uuml", 'ü'),
        ("yacute", 'ý'),
        ("thorn", 'þ'),
        ("yuml", 'ÿ'),
        ("euro", '€'),
        ("ndash", '–'),
        ("mdash", '—'),
        ("lsquo", '‘'),
        ("rsquo", '’'),
        ("ldquo", '“'),
        ("rdquo", '”'),
        ("bull", '•'),
        ("hellip", '…'),
        ("trade", '™'),
    ]
    .into_iter()
    .collect()
});

/// Escapes the five characters with special meaning in markup.
#[must_use]
pub fn html_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Replaces named and numeric (`&#233;`, `&#xE9;`) character references.
/// Unknown or malformed references are copied through unchanged.
#[must_use]
pub fn html_decode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| resolve_entity(&rest[1..semi]).map(|ch| (ch, semi)));
        if let Some((ch, semi)) = decoded {
            out.push(ch);
            rest = &rest[semi + 1..];
        } else {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    HTML_ENTITIES.get(name).copied()
}
