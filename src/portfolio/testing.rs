//! Deterministic fixtures for unit tests.

use chrono::Days;
use chrono::NaiveDate;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

use super::data::ReturnMatrix;

/// Consecutive calendar days starting 2020-01-01.
pub(crate) fn calendar(n: usize) -> Vec<NaiveDate> {
  let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
  (0..n)
    .map(|i| start.checked_add_days(Days::new(i as u64)).unwrap())
    .collect()
}

/// Gaussian daily returns with asset-specific drift and volatility.
pub(crate) fn synthetic_matrix(n_assets: usize, n_days: usize, seed: u64) -> ReturnMatrix {
  let mut rng = StdRng::seed_from_u64(seed);
  let noise = Normal::new(0.0, 1.0).unwrap();
  let returns = Array2::from_shape_fn((n_days, n_assets), |(_, j)| {
    let drift = 0.0002 * (j as f64 + 1.0);
    let vol = 0.008 + 0.004 * j as f64;
    drift + vol * noise.sample(&mut rng)
  });
  let assets = (0..n_assets).map(|j| format!("A{j}")).collect();
  ReturnMatrix::new(assets, calendar(n_days), returns).unwrap()
}

/// Matrix built from explicit columns over consecutive days.
pub(crate) fn matrix_from_columns(columns: &[Vec<f64>]) -> ReturnMatrix {
  let n_days = columns[0].len();
  let returns = Array2::from_shape_fn((n_days, columns.len()), |(t, j)| columns[j][t]);
  let assets = (0..columns.len()).map(|j| format!("A{j}")).collect();
  ReturnMatrix::new(assets, calendar(n_days), returns).unwrap()
}
