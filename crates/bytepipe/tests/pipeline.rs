#![expect(missing_docs)]

use std::{fs, thread};

use bytepipe::{
    BinaryInputStream, BinaryOutputStream, CompressionAlgorithm, DEFAULT_LEVEL, EncodingConvertor,
    FileInputStream, FileOutputStream, InputStream, OutputStream, StreamError, StreamReader,
    TransformInputStream, TransformOutputStream, TransformStreamOptions, UTF_8, UTF_16LE, compress,
    compressor, decompress, decompressor, pipe,
};
use rstest::rstest;

mod common;

#[rstest]
fn every_level_round_trips(
    #[values("zlib", "deflate", "gzip", "bzip2")] algorithm: &str,
    #[values(DEFAULT_LEVEL, 0, 1, 5, 9)] level: i32,
) {
    let data = common::payload(20_000);
    let packed = compress(algorithm, &data, level).unwrap();
    assert_eq!(decompress(algorithm, &packed).unwrap(), data);
}

#[rstest]
#[case("zlib")]
#[case("deflate")]
#[case("gzip")]
#[case("bzip2")]
fn one_byte_output_window_reaches_the_end(#[case] algorithm: &str) {
    let data = common::payload(8_000);
    let packed = common::drip(&mut compressor(algorithm, 6).unwrap(), &data).unwrap();
    let unpacked = common::drip(&mut decompressor(algorithm).unwrap(), &packed).unwrap();
    assert_eq!(unpacked, data);
}

#[test]
fn one_byte_window_converts_text() {
    let text = "Grüße, 世界 🦀\n".repeat(50);
    let mut to_utf16 = EncodingConvertor::new(&UTF_8, &UTF_16LE);
    let wide = common::drip(&mut to_utf16, text.as_bytes()).unwrap();
    let mut back = EncodingConvertor::new(&UTF_16LE, &UTF_8);
    assert_eq!(common::drip(&mut back, &wide).unwrap(), text.as_bytes());
}

#[test]
fn unknown_algorithm_is_rejected() {
    let err = compress("lzma", b"x", 6).unwrap_err();
    assert!(matches!(err, StreamError::Compression { .. }));
    let err = decompress("lzma", b"x").unwrap_err();
    assert!(matches!(err, StreamError::Decompression { .. }));
    let err = compress("gzip", b"x", 10).unwrap_err();
    assert!(matches!(err, StreamError::InvalidArgument(_)));
}

#[test]
fn corrupt_input_poisons_the_stream() {
    let mut packed = compress("zlib", &common::payload(4_000), 6).unwrap();
    packed[10] ^= 0xFF;
    packed[11] ^= 0xFF;
    let mut stream = TransformInputStream::new(
        BinaryInputStream::new(packed),
        CompressionAlgorithm::Zlib.decompressor(),
    );
    let err = common::read_in(&mut stream, 64).unwrap_err();
    assert!(matches!(err, StreamError::Decompression { .. }), "{err}");
    let mut buf = [0u8; 8];
    assert!(stream.read(&mut buf).is_err());
}

#[test]
fn file_gzip_file_then_lines() {
    let path = common::scratch("log.gz");
    let options = TransformStreamOptions { buffer_size: 7 };
    let mut out = TransformOutputStream::with_options(
        FileOutputStream::create(&path, false).unwrap(),
        CompressionAlgorithm::Gzip.compressor(9).unwrap(),
        options,
    )
    .unwrap();
    for piece in common::LOG.as_bytes().chunks(5) {
        out.write(piece).unwrap();
    }
    out.close().unwrap();
    assert!(matches!(out.write(b"late"), Err(StreamError::StreamState(_))));

    let raw = fs::read(&path).unwrap();
    assert_eq!(&raw[..2], [0x1F, 0x8B]);

    let unpacked = TransformInputStream::with_options(
        FileInputStream::open(&path).unwrap(),
        CompressionAlgorithm::Gzip.decompressor(),
        options,
    )
    .unwrap();
    let lines: Vec<String> = StreamReader::new(unpacked, &UTF_8)
        .lines(None, true)
        .map(|line| line.unwrap().to_string())
        .collect();
    fs::remove_file(&path).unwrap();
    assert_eq!(
        lines,
        [
            "GET /index.html 200",
            "POST /api/upload 201",
            "GET /missing 404",
            "DELETE /api/item/7 204",
        ]
    );
}

#[test]
fn compressing_writer_on_another_thread_feeds_a_pipe() {
    let (rx, tx) = pipe().unwrap();
    let data = common::payload(100_000);
    let expected = data.clone();
    let producer = thread::spawn(move || {
        let mut out = TransformOutputStream::new(tx, CompressionAlgorithm::Bzip2.compressor(1)?);
        for piece in data.chunks(1_000) {
            out.write(piece)?;
        }
        out.close()
    });

    let mut input = TransformInputStream::new(rx, CompressionAlgorithm::Bzip2.decompressor());
    let got = common::read_in(&mut input, 513).unwrap();
    producer.join().unwrap().unwrap();
    assert_eq!(got, expected);
}

#[test]
fn stacked_transforms_convert_then_compress() {
    let text = "línea uno\nlínea dos\n";
    let zipped = TransformOutputStream::new(
        BinaryOutputStream::new(),
        compressor("zlib", DEFAULT_LEVEL).unwrap(),
    );
    let mut out = TransformOutputStream::new(zipped, EncodingConvertor::new(&UTF_8, &UTF_16LE));
    out.write(text.as_bytes()).unwrap();
    let zipped = out.into_inner().unwrap();
    let packed = zipped.into_inner().unwrap().into_bytes();

    let unzipped = TransformInputStream::new(
        BinaryInputStream::new(packed),
        CompressionAlgorithm::Zlib.decompressor(),
    );
    let mut reader = StreamReader::new(unzipped, &UTF_16LE);
    let first = reader.read_line(None, true).unwrap().unwrap();
    assert_eq!(first.to_string(), "línea uno");
    let second = reader.read_line(None, false).unwrap().unwrap();
    let second = second.convert_encoding(&UTF_8).unwrap();
    assert_eq!(second.as_str(), Some("línea dos\n"));
    assert!(reader.read_line(None, false).unwrap().is_none());
}
