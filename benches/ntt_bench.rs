use criterion::{black_box, criterion_group, criterion_main, Criterion};
use primechunk::ntt::Ntt;

// modulus=17 is prime, 17-1=16; 3 is a primitive root of 17, and
// 3^(16/4) mod 17 = 13 is a primitive 4th root of unity.
const M: u64 = 17;
const OMEGA4: u64 = 13;

fn bench_forward(c: &mut Criterion) {
    let ntt = Ntt::new(true);
    let x = vec![1u64, 2, 3, 4];
    c.bench_function("ntt::forward(len=4)", |b| {
        b.iter(|| ntt.forward(M, OMEGA4, black_box(&x)).unwrap());
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let ntt = Ntt::new(true);
    let x = vec![5u64, 0, 16, 8];
    c.bench_function("ntt::verify_round_trip(len=4)", |b| {
        b.iter(|| ntt.verify_round_trip(M, OMEGA4, black_box(&x)).unwrap());
    });
}

criterion_group!(benches, bench_forward, bench_round_trip);
criterion_main!(benches);
