// benches/mapq.rs
// Criterion benchmark for the mapping-quality estimator.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use rapid_align::mapq::compute_mapq;

fn bench_compute_mapq(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let inputs: Vec<(f64, f64, u32, Option<u32>)> = (0..4096)
        .map(|_| {
            let p_best: f64 = rng.gen_range(1e-9..1.0);
            let p_all = p_best + rng.gen_range(0.0..1.0);
            let edit_distance = rng.gen_range(0..12);
            let cluster = if rng.gen_bool(0.3) {
                Some(rng.gen_range(0..100_000))
            } else {
                None
            };
            (p_all, p_best, edit_distance, cluster)
        })
        .collect();

    let mut group = c.benchmark_group("mapq");
    group.throughput(Throughput::Elements(inputs.len() as u64));
    group.bench_function("compute_mapq", |b| {
        b.iter(|| {
            let mut acc = 0u64;
            for &(p_all, p_best, dist, cluster) in &inputs {
                acc += compute_mapq(black_box(p_all), black_box(p_best), dist, cluster) as u64;
            }
            acc
        })
    });
    group.finish();
}

criterion_group!(benches, bench_compute_mapq);
criterion_main!(benches);
