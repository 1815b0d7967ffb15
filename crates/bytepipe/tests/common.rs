#![allow(dead_code)]

use std::{env, path::PathBuf, process};

use bytepipe::{InputStream, Result, Transform};

/// Mixed-terminator log used by several tests.
pub const LOG: &str = concat!(
    "GET /index.html 200\r\n",
    "POST /api/upload 201\n",
    "GET /missing 404\r",
    "DELETE /api/item/7 204",
);

/// A per-process scratch path under the system temp directory.
pub fn scratch(name: &str) -> PathBuf {
    env::temp_dir().join(format!("bytepipe-{}-{name}", process::id()))
}

/// Deterministic, moderately compressible payload.
pub fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if i % 3 == 0 { b'a' + (state % 7) as u8 } else { (state >> 24) as u8 }
        })
        .collect()
}

/// Drives `transform` with a one-byte output window, asserting the bound
/// contract on every call.
pub fn drip<T: Transform + ?Sized>(transform: &mut T, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut dst = [0u8; 1];
    let mut offset = 0;
    while offset < input.len() {
        let (consumed, produced) = transform.apply(Some(&input[offset..]), &mut dst)?;
        assert!(consumed <= input.len() - offset);
        assert!(produced <= 1);
        assert!(consumed > 0 || produced > 0, "{} stalled", transform.name());
        out.extend_from_slice(&dst[..produced]);
        offset += consumed;
    }
    loop {
        let (consumed, produced) = transform.apply(None, &mut dst)?;
        assert_eq!(consumed, 0);
        if produced == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&dst[..produced]);
    }
}

/// Reads `stream` to the end in `size`-byte reads.
pub fn read_in<S: InputStream>(stream: &mut S, size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; size];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}
