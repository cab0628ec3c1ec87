//! Statistics engine benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use imverify_core::{
    BootstrapMethod, DataPlane, NbrhdShape, PairStore, Threshold, VerifyConfig,
};
use imverify_stats::bootstrap::seeded_rng;
use imverify_stats::categorical::compute_cts;
use imverify_stats::continuous::{compute_cnt, PairFilter};
use imverify_stats::neighborhood::fractional_coverage;

fn generate_pairs(count: usize) -> PairStore {
    let f: Vec<f64> = (0..count)
        .map(|i| (i as f64 * 0.13).sin() * 5.0 + 10.0)
        .collect();
    let o: Vec<f64> = (0..count)
        .map(|i| (i as f64 * 0.13 + 0.4).sin() * 4.0 + 10.5)
        .collect();
    PairStore::new(f, o).expect("equal lengths")
}

fn generate_field(n: usize) -> DataPlane {
    let values: Vec<f64> = (0..n * n)
        .map(|k| (((k / n) as f64 * 0.21).sin() + ((k % n) as f64 * 0.17).cos()) * 2.0)
        .collect();
    DataPlane::from_vec(n, n, values).expect("square field")
}

fn config(method: BootstrapMethod, n_rep: usize) -> VerifyConfig {
    let mut config = VerifyConfig::default();
    config.ci.bootstrap.method = method;
    config.ci.bootstrap.n_rep = n_rep;
    config
}

// === Continuous Benchmarks ===

fn bench_cnt_normal_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("cnt_normal_only");
    for count in [100, 1_000, 10_000] {
        let pairs = generate_pairs(count);
        let config = config(BootstrapMethod::Percentile, 0);
        group.bench_with_input(BenchmarkId::from_parameter(count), &pairs, |b, pairs| {
            b.iter(|| {
                compute_cnt(
                    black_box(pairs),
                    &PairFilter::default(),
                    &config,
                    &mut seeded_rng(1),
                )
            })
        });
    }
    group.finish();
}

// === Bootstrap Benchmarks ===

fn bench_bootstrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bootstrap_cts");
    group.sample_size(20);
    let pairs = generate_pairs(500);
    let t = Threshold::ge(10.0).resolve_fixed().expect("fixed threshold");
    for method in [BootstrapMethod::Percentile, BootstrapMethod::Bca] {
        let config = config(method, 200);
        group.bench_function(format!("{method:?}"), |b| {
            b.iter(|| compute_cts(black_box(&pairs), &t, &t, &config, &mut seeded_rng(1)))
        });
    }
    group.finish();
}

// === Neighborhood Benchmarks ===

fn bench_fractional_coverage(c: &mut Criterion) {
    let mut group = c.benchmark_group("fractional_coverage");
    let field = generate_field(200);
    let t = Threshold::ge(1.0).resolve_fixed().expect("fixed threshold");
    for width in [3, 9, 25] {
        for shape in [NbrhdShape::Square, NbrhdShape::Circle] {
            group.bench_with_input(
                BenchmarkId::new(format!("{shape:?}"), width),
                &width,
                |b, &width| {
                    b.iter(|| fractional_coverage(black_box(&field), &t, shape, width, 0.5))
                },
            );
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_cnt_normal_only,
    bench_bootstrap,
    bench_fractional_coverage,
);
criterion_main!(benches);
