//! Framer and COBS benchmarks over representative payload sizes.

use bakelite::runtime::{cobs, crc, CrcKind, FrameEvent, Framer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn bench_cobs(c: &mut Criterion) {
    let src = payload(1024);
    let mut dst = vec![0u8; cobs::max_encoded_len(src.len())];

    c.bench_function("cobs_encode_1k", |b| {
        b.iter(|| {
            let res = cobs::encode(black_box(&mut dst), black_box(&src));
            black_box(res.out_len)
        })
    });

    let enc = cobs::encode(&mut dst, &src);
    let encoded = dst[..enc.out_len].to_vec();
    c.bench_function("cobs_decode_in_place_1k", |b| {
        b.iter(|| {
            let mut buf = encoded.clone();
            let res = cobs::decode_in_place(black_box(&mut buf), encoded.len());
            black_box(res.out_len)
        })
    });
}

fn bench_crc(c: &mut Criterion) {
    let data = payload(1024);
    c.bench_function("crc32_1k", |b| {
        b.iter(|| black_box(crc::crc32(black_box(&data), 0)))
    });
}

fn bench_framer_roundtrip(c: &mut Criterion) {
    let msg = payload(200);

    c.bench_function("framer_roundtrip_200b_crc16", |b| {
        let mut framer = Framer::new(256, CrcKind::Crc16);
        b.iter(|| {
            let frame: Vec<u8> = framer.encode_copy(black_box(&msg)).unwrap().to_vec();
            let mut delivered = 0usize;
            for &byte in &frame {
                if let FrameEvent::Complete { len } = framer.push_byte(byte) {
                    delivered = len;
                }
            }
            black_box(delivered)
        })
    });
}

criterion_group!(benches, bench_cobs, bench_crc, bench_framer_roundtrip);
criterion_main!(benches);
