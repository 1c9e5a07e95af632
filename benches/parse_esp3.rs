use criterion::{criterion_group, criterion_main, Criterion};

use enocean_gateway::InboundFramer;

// recorded USB300 telegrams
const A5_04_01: &[u8] = &[
    85, 0, 10, 7, 1, 235, 165, 0, 229, 204, 10, 5, 17, 114, 247, 0, 1, 255, 255, 255, 255, 54, 0,
    213,
];
const F6_02_01: &[u8] = &[
    85, 0, 7, 7, 1, 122, 246, 0, 254, 245, 143, 212, 32, 2, 255, 255, 255, 255, 48, 0, 39,
];
const RESPONSE: &[u8] = &[85, 0, 5, 1, 2, 219, 0, 255, 155, 18, 128, 10, 17];

fn parse_all(bytes: &[u8]) -> usize {
    let mut framer = InboundFramer::new();
    framer.push(bytes);
    let mut count = 0;
    while framer.next_packet().is_some() {
        count += 1;
    }
    count
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("parse_esp3_a50401", |b| b.iter(|| parse_all(A5_04_01)));
    c.bench_function("parse_esp3_f60201", |b| b.iter(|| parse_all(F6_02_01)));
    c.bench_function("parse_esp3_response", |b| b.iter(|| parse_all(RESPONSE)));

    // worst case: garbage with false sync bytes in front of a valid frame
    let mut noisy = vec![0x55, 0x00, 0x55, 0x12, 0xAB, 0x55];
    noisy.extend_from_slice(A5_04_01);
    c.bench_function("parse_esp3_resync", |b| b.iter(|| parse_all(&noisy)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
