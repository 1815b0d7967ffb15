//! Writes a gzip-compressed, UTF-16LE access log through a layered writer
//! and then streams it back line by line, never holding the decompressed
//! file in memory.
//!
//! Run with
//!
//! ```bash
//! cargo run -p bytepipe --example gzip_lines
//! ```

use std::env;

use bytepipe::{
    CompressionAlgorithm, EncodingConvertor, FileInputStream, FileOutputStream,
    InputStreamLineIterator, Result, StdoutOutputStream, StreamWriter, TransformInputStream,
    TransformOutputStream, UTF_8, UTF_16LE,
};

const REQUESTS: &[(&str, &str, u16)] = &[
    ("GET", "/", 200),
    ("GET", "/städte/zürich", 200),
    ("POST", "/api/upload", 201),
    ("GET", "/missing", 404),
    ("DELETE", "/api/item/7", 204),
];

fn main() -> Result<()> {
    let path = env::temp_dir().join("bytepipe-access-log.gz");

    // file <- gzip <- text in the file's encoding
    let file = FileOutputStream::create(&path, false)?;
    let gzip = TransformOutputStream::new(file, CompressionAlgorithm::Gzip.compressor(9)?);
    let mut log = StreamWriter::new(gzip, &UTF_16LE);
    for (i, (method, target, status)) in REQUESTS.iter().enumerate() {
        write!(log, "{i:04} {method} {target} {status}\r\n")?;
    }
    log.close()?;

    // file -> gunzip -> UTF-16LE to UTF-8 -> lines
    let unpacked = TransformInputStream::new(
        FileInputStream::open(&path)?,
        CompressionAlgorithm::Gzip.decompressor(),
    );
    let utf8 = TransformInputStream::new(unpacked, EncodingConvertor::new(&UTF_16LE, &UTF_8));
    let mut lines = InputStreamLineIterator::new(utf8, &UTF_8, None, true);

    let mut out = StreamWriter::new(StdoutOutputStream::stdout(), &UTF_8);
    while let Some(line) = lines.next().transpose()? {
        if line.find("404")?.is_some() {
            write!(out, "line {}: not found -> ", lines.line_number())?;
        }
        out.write_string(&line)?;
        out.write_line("")?;
    }
    out.close()?;

    std::fs::remove_file(&path)?;
    Ok(())
}
