use std::hint::black_box;

use chrono::Days;
use chrono::NaiveDate;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use frontier_rs::portfolio::AssetStatistics;
use frontier_rs::portfolio::MonteCarloSampler;
use frontier_rs::portfolio::Resolution;
use frontier_rs::portfolio::ReturnMatrix;
use frontier_rs::portfolio::RiskMetricEngine;
use frontier_rs::portfolio::WeightScheme;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

const DAYS: usize = 1_260;

fn synthetic_matrix(n_assets: usize) -> ReturnMatrix {
  let mut rng = StdRng::seed_from_u64(1);
  let noise = Normal::new(0.0, 0.01).unwrap();
  let returns = Array2::from_shape_fn((DAYS, n_assets), |_| 0.0003 + noise.sample(&mut rng));
  let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
  let dates = (0..DAYS)
    .map(|i| start.checked_add_days(Days::new(i as u64)).unwrap())
    .collect();
  let assets = (0..n_assets).map(|j| format!("A{j}")).collect();
  ReturnMatrix::new(assets, dates, returns).unwrap()
}

fn bench_sampling(c: &mut Criterion) {
  let mut group = c.benchmark_group("sample");

  for &n_assets in &[5, 10, 30] {
    let matrix = synthetic_matrix(n_assets);
    let stats = AssetStatistics::estimate(&matrix).unwrap();
    for scheme in [WeightScheme::NormalizedUniform, WeightScheme::Dirichlet] {
      let sampler = MonteCarloSampler::new(10_000, 0.02, 252.0, scheme, Some(7));
      group.bench_with_input(
        BenchmarkId::new(format!("{scheme:?}"), n_assets),
        &n_assets,
        |b, _| b.iter(|| black_box(sampler.sample(&stats, matrix.assets()).unwrap())),
      );
    }
  }

  group.finish();
}

fn bench_augment(c: &mut Criterion) {
  let mut group = c.benchmark_group("augment");
  group.sample_size(20);

  let matrix = synthetic_matrix(10);
  let stats = AssetStatistics::estimate(&matrix).unwrap();
  let samples = MonteCarloSampler::new(10_000, 0.02, 252.0, WeightScheme::NormalizedUniform, Some(7))
    .sample(&stats, matrix.assets())
    .unwrap();

  for resolution in [Resolution::Native, Resolution::Monthly] {
    let engine = RiskMetricEngine::new(0.95, 100_000.0, resolution, None);
    group.bench_function(format!("{resolution:?}"), |b| {
      b.iter(|| black_box(engine.augment(&samples, &matrix).unwrap()))
    });
  }

  group.finish();
}

criterion_group!(benches, bench_sampling, bench_augment);
criterion_main!(benches);
