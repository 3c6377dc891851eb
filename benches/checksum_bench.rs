use criterion::{black_box, criterion_group, criterion_main, Criterion};
use primechunk::checksum::{attach, batch_checksum, derive, extract, ChecksumCache, DEFAULT_K};
use primechunk::registry::PrimeRegistry;
use rug::Integer;

fn bench_derive_cold(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    let factors = r.factor(&Integer::from(277_200u32)).unwrap();
    c.bench_function("derive(factor(277200))", |b| {
        b.iter(|| derive(black_box(&factors), black_box(&r)).unwrap());
    });
}

fn bench_attach(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    let raw = Integer::from(277_200u32);
    let factors = r.factor(&raw).unwrap();
    c.bench_function("attach(277200)", |b| {
        b.iter(|| attach(black_box(&raw), black_box(&factors), &r, DEFAULT_K, false).unwrap());
    });
}

fn bench_extract(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    let raw = Integer::from(277_200u32);
    let factors = r.factor(&raw).unwrap();
    let attached = attach(&raw, &factors, &r, DEFAULT_K, false).unwrap();
    c.bench_function("extract(attach(277200))", |b| {
        b.iter(|| extract(black_box(&attached), &r, DEFAULT_K).unwrap());
    });
}

fn bench_checksum_cache_hit(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    let cache = ChecksumCache::new(1024);
    let factors = r.factor(&Integer::from(277_200u32)).unwrap();
    cache.derive(&factors, &r).unwrap();
    c.bench_function("ChecksumCache::derive cache hit", |b| {
        b.iter(|| cache.derive(black_box(&factors), &r).unwrap());
    });
}

fn bench_batch_checksum(c: &mut Criterion) {
    let r = PrimeRegistry::new();
    let values: Vec<Integer> = (1u32..=64)
        .map(|n| {
            let raw = Integer::from(n);
            let factors = r.factor(&raw).unwrap();
            attach(&raw, &factors, &r, DEFAULT_K, false).unwrap()
        })
        .collect();
    c.bench_function("batch_checksum(64 values)", |b| {
        b.iter(|| batch_checksum(black_box(&values), &r).unwrap());
    });
}

criterion_group!(
    benches,
    bench_derive_cold,
    bench_attach,
    bench_extract,
    bench_checksum_cache_hit,
    bench_batch_checksum,
);
criterion_main!(benches);
