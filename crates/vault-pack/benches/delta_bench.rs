use criterion::{criterion_group, criterion_main, Criterion};
use vault_pack::delta::{apply::apply_delta, compute::compute_delta};

fn edited_copy(source: &[u8]) -> Vec<u8> {
    let mut target = source.to_vec();
    for i in (0..target.len()).step_by(512) {
        target[i] = target[i].wrapping_add(1);
    }
    target
}

fn bench_compute(c: &mut Criterion) {
    let source: Vec<u8> = (0..16384u32).map(|i| (i % 251) as u8).collect();
    let target = edited_copy(&source);

    c.bench_function("delta_compute_16k", |b| {
        b.iter(|| compute_delta(&source, &target));
    });
}

fn bench_apply(c: &mut Criterion) {
    let source: Vec<u8> = (0..16384u32).map(|i| (i % 251) as u8).collect();
    let target = edited_copy(&source);
    let delta = compute_delta(&source, &target);

    c.bench_function("delta_apply_16k", |b| {
        b.iter(|| apply_delta(&source, &delta).unwrap());
    });
}

criterion_group!(benches, bench_compute, bench_apply);
criterion_main!(benches);
