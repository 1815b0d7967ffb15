//! Benchmark – streaming transforms and the line reader
#![allow(missing_docs)]

use std::time::Duration;

use bytepipe::{
    BinaryInputStream, BinaryOutputStream, CompressionAlgorithm, EncodingConvertor, InputStream,
    OutputStream, StreamReader, TransformInputStream, TransformOutputStream, UTF_8, UTF_16LE,
    compress, transform_all,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Log-like text of at least `target_len` bytes with mixed terminators,
/// ending on a line boundary.
fn make_log(target_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(target_len + 64);
    let mut i = 0u32;
    while out.len() < target_len {
        let eol: &[u8] = match i % 3 {
            0 => b"\n",
            1 => b"\r\n",
            _ => b"\r",
        };
        let line = format!("{i:08} GET /item/{} status=200 größe=ok", i * 7);
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(eol);
        i += 1;
    }
    out
}

fn bench_compression(c: &mut Criterion) {
    let data = make_log(256 * 1024);
    let mut group = c.benchmark_group("compression");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for algorithm in [
        CompressionAlgorithm::Zlib,
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Bzip2,
    ] {
        let packed = compress(algorithm.as_str(), &data, 6).unwrap();
        group.bench_with_input(BenchmarkId::new("write", algorithm), &data, |b, data| {
            b.iter(|| {
                let mut out = TransformOutputStream::new(
                    BinaryOutputStream::new(),
                    algorithm.compressor(6).unwrap(),
                );
                for piece in data.chunks(1_500) {
                    out.write(black_box(piece)).unwrap();
                }
                black_box(out.into_inner().unwrap().into_bytes().len());
            });
        });
        group.bench_with_input(BenchmarkId::new("read", algorithm), &packed, |b, packed| {
            b.iter(|| {
                let mut input = TransformInputStream::new(
                    BinaryInputStream::new(packed.clone()),
                    algorithm.decompressor(),
                );
                black_box(input.read_to_end().unwrap().len());
            });
        });
    }
    group.finish();
}

fn bench_conversion(c: &mut Criterion) {
    let data = make_log(256 * 1024);
    let mut group = c.benchmark_group("conversion");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("utf8_to_utf16le", |b| {
        b.iter(|| {
            let mut convertor = EncodingConvertor::new(&UTF_8, &UTF_16LE);
            let wide = transform_all(&mut convertor, black_box(&data)).unwrap();
            black_box(wide.len());
        });
    });
    group.finish();
}

fn bench_lines(c: &mut Criterion) {
    let data = make_log(256 * 1024);
    let wide = transform_all(&mut EncodingConvertor::new(&UTF_8, &UTF_16LE), &data).unwrap();
    let mut group = c.benchmark_group("read_lines");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("auto_utf8", |b| {
        b.iter(|| {
            let reader = StreamReader::new(BinaryInputStream::new(data.clone()), &UTF_8);
            black_box(reader.lines(None, true).count());
        });
    });
    group.bench_function("auto_utf16le", |b| {
        b.iter(|| {
            let reader = StreamReader::new(BinaryInputStream::new(wide.clone()), &UTF_16LE);
            black_box(reader.lines(None, true).count());
        });
    });
    group.bench_function("explicit_crlf_utf8", |b| {
        b.iter(|| {
            let reader = StreamReader::new(BinaryInputStream::new(data.clone()), &UTF_8);
            black_box(reader.lines(Some("\r\n"), false).count());
        });
    });
    group.finish();
}

fn criterion() -> Criterion {
    let mut c = Criterion::default();
    if cfg!(feature = "bench-fast") {
        c = c
            .warm_up_time(Duration::from_millis(10))
            .measurement_time(Duration::from_millis(100))
            .sample_size(10);
    } else {
        c = c
            .warm_up_time(Duration::from_secs(2))
            .measurement_time(Duration::from_secs(5));
    }
    c
}

criterion_group! {
    name = benches;
    config = criterion();
    targets = bench_compression, bench_conversion, bench_lines
}
criterion_main!(benches);
