use criterion::{black_box, criterion_group, criterion_main, Criterion};
use primechunk::registry::{is_prime, PrimeRegistry};
use rug::Integer;

fn bench_is_prime_small(c: &mut Criterion) {
    let n = Integer::from(104_729u32); // the 10,000th prime
    c.bench_function("is_prime(10000th prime)", |b| {
        b.iter(|| is_prime(black_box(&n)));
    });
}

fn bench_is_prime_composite(c: &mut Criterion) {
    let n = Integer::from(104_730u32);
    c.bench_function("is_prime(composite near 10000th prime)", |b| {
        b.iter(|| is_prime(black_box(&n)));
    });
}

fn bench_get_prime_sequential(c: &mut Criterion) {
    c.bench_function("get_prime(0..1000) cold registry", |b| {
        b.iter(|| {
            let r = PrimeRegistry::new();
            for i in 0..1000 {
                black_box(r.get_prime(black_box(i)));
            }
        });
    });
}

fn bench_get_prime_warm_lookup(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    r.extend_to(1000);
    c.bench_function("get_prime(999) already materialized", |b| {
        b.iter(|| black_box(r.get_prime(black_box(999))));
    });
}

fn bench_factor_semiprime(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    let n = Integer::from(97u32 * 101u32);
    c.bench_function("factor(97*101)", |b| {
        b.iter(|| r.factor(black_box(&n)).unwrap());
    });
}

fn bench_factor_highly_composite(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    // 2^5 * 3^3 * 5^2 * 7 * 11 = 277200
    let n = Integer::from(277_200u32);
    c.bench_function("factor(277200)", |b| {
        b.iter(|| r.factor(black_box(&n)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_is_prime_small,
    bench_is_prime_composite,
    bench_get_prime_sequential,
    bench_get_prime_warm_lookup,
    bench_factor_semiprime,
    bench_factor_highly_composite,
);
criterion_main!(benches);
