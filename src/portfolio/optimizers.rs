//! # Minimum-Volatility Optimizer
//!
//! $$
//! \min_{\mathbf w}\ \mathbf w^\top\Sigma\mathbf w
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf w=1,\ 0\le w_i\le 1
//! $$
//!
//! Two stages. A derivative-free Nelder–Mead search on softmax coordinates
//! $w_i=e^{x_i}/\sum_j e^{x_j}$, started from equal weights ($\mathbf x=0$),
//! gives a warm start. Accelerated projected gradient on the simplex then
//! refines it until the KKT conditions hold:
//!
//! $$
//! g=2\Sigma\mathbf w,\qquad \lambda=\mathbf w^\top g,\qquad
//! g_i=\lambda\ (w_i>0),\qquad g_i\ge\lambda\ (w_i=0)
//! $$

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;
use tracing::warn;

use super::stats::AssetStatistics;
use super::types::PortfolioSample;
use super::types::SampleOrigin;
use super::types::WEIGHT_TOLERANCE;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// KKT residual accepted, as a fraction of the largest gradient entry `2·max Σᵢᵢ`.
const KKT_TOLERANCE: f64 = 1e-9;
/// Nelder–Mead budget per asset for the warm start.
const WARM_START_ITERS_PER_ASSET: u64 = 200;

fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if sum < 1e-15 {
    vec![1.0 / x.len() as f64; x.len()]
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

/// Solver settings for [`optimize_min_volatility`].
#[derive(ImplNew, Clone, Debug)]
pub struct OptimizerConfig {
  /// Iteration cap for the projected-gradient refinement. Also caps the warm start.
  pub max_iters: u64,
  /// Standard-deviation tolerance on the warm-start simplex cost values.
  pub tolerance: f64,
  /// Annualized risk-free rate, for the Sharpe ratio of the result.
  pub risk_free_rate: f64,
  /// Annualization factor.
  pub periods_per_year: f64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      max_iters: 20_000,
      tolerance: 1e-14,
      risk_free_rate: 0.0,
      periods_per_year: 252.0,
    }
  }
}

/// Converged minimum-volatility allocation.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizedPortfolio {
  /// Evaluated allocation, tagged [`SampleOrigin::Optimized`].
  pub sample: PortfolioSample,
  /// Solver iterations used.
  pub iterations: u64,
  /// Final annualized variance.
  pub objective: f64,
}

struct VarianceCost<'a> {
  stats: &'a AssetStatistics,
  periods_per_year: f64,
}

impl CostFunction for VarianceCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = softmax(x);
    Ok(self.stats.portfolio_variance(&w) * self.periods_per_year)
  }
}

/// Euclidean projection onto `{w : w ≥ 0, Σw = 1}` (sort and threshold).
fn project_onto_simplex(v: &Array1<f64>) -> Array1<f64> {
  let mut u = v.to_vec();
  u.sort_by(|a, b| b.total_cmp(a));

  let mut cumsum = 0.0;
  let mut theta = 0.0;
  for (j, &uj) in u.iter().enumerate() {
    cumsum += uj;
    let t = (cumsum - 1.0) / (j + 1) as f64;
    if uj > t {
      theta = t;
    }
  }
  v.mapv(|x| (x - theta).max(0.0))
}

/// Largest KKT residual of `w` for `min wᵀΣw` on the simplex.
fn kkt_violation(cov: &Array2<f64>, w: &Array1<f64>) -> f64 {
  let g = cov.dot(w) * 2.0;
  let lambda = w.dot(&g);
  w.iter()
    .zip(g.iter())
    .map(|(&wi, &gi)| {
      if wi > 0.0 {
        (gi - lambda).abs()
      } else {
        (lambda - gi).max(0.0)
      }
    })
    .fold(0.0, f64::max)
}

/// Absolute KKT tolerance, relative to the largest possible gradient entry.
fn kkt_tolerance(cov: &Array2<f64>) -> f64 {
  let max_var = cov.diag().iter().cloned().fold(0.0, f64::max);
  KKT_TOLERANCE * 2.0 * max_var
}

struct Refined {
  weights: Array1<f64>,
  iterations: u64,
  violation: f64,
}

/// Accelerated projected gradient with adaptive momentum restart.
fn refine_on_simplex(
  cov: &Array2<f64>,
  start: Array1<f64>,
  max_iters: u64,
  tolerance: f64,
) -> Refined {
  // Gershgorin bound on the largest eigenvalue of 2Σ
  let lipschitz = 2.0
    * cov
      .rows()
      .into_iter()
      .map(|r| r.iter().map(|v| v.abs()).sum::<f64>())
      .fold(0.0, f64::max);

  let mut w = project_onto_simplex(&start);
  let mut violation = kkt_violation(cov, &w);
  if lipschitz <= 0.0 || violation <= tolerance {
    return Refined {
      weights: w,
      iterations: 0,
      violation,
    };
  }

  let step = 1.0 / lipschitz;
  let mut y = w.clone();
  let mut t = 1.0_f64;
  for iter in 1..=max_iters {
    let grad = cov.dot(&y) * 2.0;
    let next = project_onto_simplex(&(&y - &(grad * step)));
    let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());

    if (&y - &next).dot(&(&next - &w)) > 0.0 {
      // momentum points uphill
      t = 1.0;
      y = next.clone();
    } else {
      y = &next + &((&next - &w) * ((t - 1.0) / t_next));
      t = t_next;
    }
    w = next;

    violation = kkt_violation(cov, &w);
    if violation <= tolerance {
      return Refined {
        weights: w,
        iterations: iter,
        violation,
      };
    }
  }

  Refined {
    weights: w,
    iterations: max_iters,
    violation,
  }
}

/// Nelder–Mead on softmax coordinates from equal weights. Hitting the
/// iteration budget is not an error here: the best vertex is still a valid
/// point on the simplex.
fn warm_start(stats: &AssetStatistics, config: &OptimizerConfig) -> Result<(Array1<f64>, u64)> {
  let n = stats.n_assets();
  let cost = VarianceCost {
    stats,
    periods_per_year: config.periods_per_year,
  };

  let x0 = vec![0.0; n];
  let mut simplex = Vec::with_capacity(n + 1);
  simplex.push(x0.clone());
  for i in 0..n {
    let mut point = x0.clone();
    point[i] = 1.0;
    simplex.push(point);
  }

  let budget = config.max_iters.min(WARM_START_ITERS_PER_ASSET * n as u64);
  let solver = NelderMead::new(simplex)
    .with_sd_tolerance(config.tolerance)
    .map_err(|e| PortfolioError::convergence(format!("solver setup: {e}"), 0))?;
  let res = Executor::new(cost, solver)
    .configure(|state| state.max_iters(budget))
    .run()
    .map_err(|e| PortfolioError::convergence(e.to_string(), 0))?;

  let iterations = res.state.get_iter();
  if !matches!(
    res.state.get_termination_reason(),
    Some(TerminationReason::SolverConverged)
  ) {
    debug!(iterations, budget, "simplex search stopped on its budget");
  }

  let best_x = res
    .state
    .get_best_param()
    .cloned()
    .ok_or_else(|| PortfolioError::convergence("solver returned no parameter", iterations))?;
  Ok((Array1::from(softmax(&best_x)), iterations))
}

fn check_weights(w: &[f64], iterations: u64) -> Result<()> {
  if w.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::convergence("non-finite weights", iterations));
  }
  let sum: f64 = w.iter().sum();
  if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
    return Err(PortfolioError::convergence(
      format!("weights sum to {sum}"),
      iterations,
    ));
  }
  if w
    .iter()
    .any(|v| *v < -WEIGHT_TOLERANCE || *v > 1.0 + WEIGHT_TOLERANCE)
  {
    return Err(PortfolioError::convergence("weights outside [0, 1]", iterations));
  }
  Ok(())
}

/// Long-only minimum-volatility portfolio for `stats`.
///
/// Returns [`PortfolioError::Convergence`] when the warm start errors, when the
/// refinement exhausts `max_iters` without meeting the KKT conditions, or when
/// the result breaks the sum or bound constraints.
#[tracing::instrument(skip_all, fields(assets = stats.n_assets(), max_iters = config.max_iters))]
pub fn optimize_min_volatility(
  stats: &AssetStatistics,
  config: &OptimizerConfig,
) -> Result<OptimizedPortfolio> {
  if !(config.tolerance.is_finite() && config.tolerance > 0.0) {
    return Err(PortfolioError::invalid("optimizer tolerance must be positive"));
  }
  if config.max_iters == 0 {
    return Err(PortfolioError::invalid("optimizer max_iters must be positive"));
  }
  if !(config.periods_per_year.is_finite() && config.periods_per_year > 0.0) {
    return Err(PortfolioError::invalid("periods_per_year must be positive"));
  }

  let n = stats.n_assets();
  if n == 1 {
    let weights = WeightVector::equal(1)?;
    let objective = stats.portfolio_variance(&weights) * config.periods_per_year;
    return Ok(OptimizedPortfolio {
      sample: PortfolioSample::evaluate(
        SampleOrigin::Optimized,
        weights,
        stats,
        config.risk_free_rate,
        config.periods_per_year,
      ),
      iterations: 0,
      objective,
    });
  }

  let (start, warm_iters) = warm_start(stats, config)?;
  let cov = stats.covariance();
  let tolerance = kkt_tolerance(cov);
  let refined = refine_on_simplex(cov, start, config.max_iters, tolerance);
  let iterations = warm_iters + refined.iterations;

  if refined.violation > tolerance {
    warn!(iterations, violation = refined.violation, "optimizer did not converge");
    return Err(PortfolioError::convergence(
      format!(
        "KKT residual {:.3e} above {:.3e}",
        refined.violation, tolerance
      ),
      iterations,
    ));
  }

  let w = refined.weights.to_vec();
  check_weights(&w, iterations)?;

  let weights = WeightVector::new(w)
    .map_err(|e| PortfolioError::convergence(e.to_string(), iterations))?;
  let sample = PortfolioSample::evaluate(
    SampleOrigin::Optimized,
    weights,
    stats,
    config.risk_free_rate,
    config.periods_per_year,
  );
  let objective = sample.annualized_volatility.powi(2);
  debug!(
    warm_iters,
    refine_iters = refined.iterations,
    volatility = sample.annualized_volatility,
    "optimizer converged"
  );

  Ok(OptimizedPortfolio {
    sample,
    iterations,
    objective,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::portfolio::sampler::MonteCarloSampler;
  use crate::portfolio::sampler::WeightScheme;
  use crate::portfolio::testing::synthetic_matrix;

  #[test]
  fn perfectly_hedged_pair_splits_evenly() {
    let v = 1e-4;
    let stats = AssetStatistics::from_parts(array![0.0005, 0.0003], array![[v, -v], [-v, v]])
      .unwrap();
    let res = optimize_min_volatility(&stats, &OptimizerConfig::default()).unwrap();

    assert_abs_diff_eq!(res.sample.weights[0], 0.5, epsilon = 1e-4);
    assert_abs_diff_eq!(res.sample.weights[1], 0.5, epsilon = 1e-4);
    assert_abs_diff_eq!(res.sample.annualized_volatility, 0.0, epsilon = 1e-3);
    assert_eq!(res.sample.origin, SampleOrigin::Optimized);
  }

  #[test]
  fn uncorrelated_assets_weight_by_inverse_variance() {
    let stats = AssetStatistics::from_parts(
      array![0.0, 0.0],
      array![[1e-4, 0.0], [0.0, 4e-4]],
    )
    .unwrap();
    let res = optimize_min_volatility(&stats, &OptimizerConfig::default()).unwrap();

    // w_1 ∝ 1/σ₁², w_2 ∝ 1/σ₂²
    assert_abs_diff_eq!(res.sample.weights[0], 0.8, epsilon = 1e-3);
    assert_abs_diff_eq!(res.sample.weights[1], 0.2, epsilon = 1e-3);
  }

  #[test]
  fn result_respects_simplex_and_beats_sampling() {
    let matrix = synthetic_matrix(4, 500, 8);
    let stats = AssetStatistics::estimate(&matrix).unwrap();
    let res = optimize_min_volatility(&stats, &OptimizerConfig::default()).unwrap();

    assert_abs_diff_eq!(res.sample.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(res.sample.weights.iter().all(|w| (0.0..=1.0).contains(w)));

    let set = MonteCarloSampler::new(2_000, 0.0, 252.0, WeightScheme::NormalizedUniform, Some(3))
      .sample(&stats, matrix.assets())
      .unwrap();
    let sampled_min = set
      .iter()
      .map(|s| s.annualized_volatility)
      .fold(f64::INFINITY, f64::min);
    assert!(res.sample.annualized_volatility <= sampled_min + 1e-9);
  }

  #[test]
  fn single_asset_needs_no_search() {
    let stats = AssetStatistics::from_parts(array![0.001], array![[0.0004]]).unwrap();
    let res = optimize_min_volatility(&stats, &OptimizerConfig::default()).unwrap();
    assert_eq!(res.iterations, 0);
    assert_abs_diff_eq!(res.sample.weights[0], 1.0);
  }

  #[test]
  fn iteration_cap_is_reported_as_convergence_failure() {
    let matrix = synthetic_matrix(5, 300, 2);
    let stats = AssetStatistics::estimate(&matrix).unwrap();
    let config = OptimizerConfig::new(3, 1e-14, 0.0, 252.0);

    // three warm-start plus three refinement steps at most
    let err = optimize_min_volatility(&stats, &config).unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::Convergence { iterations, .. } if iterations <= 6
    ));
  }

  /// Solve `A x = b` by Gaussian elimination with partial pivoting.
  fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let m = b.len();
    for col in 0..m {
      let pivot = (col..m)
        .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
        .unwrap();
      a.swap(col, pivot);
      b.swap(col, pivot);
      for row in col + 1..m {
        let f = a[row][col] / a[col][col];
        for k in col..m {
          a[row][k] -= f * a[col][k];
        }
        b[row] -= f * b[col];
      }
    }
    let mut x = vec![0.0; m];
    for row in (0..m).rev() {
      let tail: f64 = (row + 1..m).map(|k| a[row][k] * x[k]).sum();
      x[row] = (b[row] - tail) / a[row][row];
    }
    x
  }

  /// Closed-form minimum variance restricted to `support`: `w_S ∝ Σ_SS⁻¹ 1`.
  fn closed_form_on_support(cov: &Array2<f64>, support: &[usize]) -> Vec<f64> {
    let a = support
      .iter()
      .map(|&i| support.iter().map(|&j| cov[[i, j]]).collect())
      .collect();
    let z = solve_dense(a, vec![1.0; support.len()]);
    let total: f64 = z.iter().sum();
    z.iter().map(|v| v / total).collect()
  }

  #[test]
  fn thirty_and_forty_assets_match_closed_form_on_active_set() {
    for n in [30, 40] {
      let matrix = synthetic_matrix(n, 1_260, 3);
      let stats = AssetStatistics::estimate(&matrix).unwrap();
      let res = optimize_min_volatility(&stats, &OptimizerConfig::default()).unwrap();

      let w = Array1::from(res.sample.weights.to_vec());
      let cov = stats.covariance();
      assert!(kkt_violation(cov, &w) <= kkt_tolerance(cov));

      let support: Vec<usize> = (0..n).filter(|&i| w[i] > 1e-12).collect();
      let reference = closed_form_on_support(cov, &support);
      let mut full = vec![0.0; n];
      for (&i, &v) in support.iter().zip(reference.iter()) {
        assert!(v > -1e-9);
        assert_abs_diff_eq!(w[i], v, epsilon = 1e-5);
        full[i] = v;
      }

      // the reference must itself satisfy the inactive-set condition
      let full = Array1::from(full);
      let g = cov.dot(&full) * 2.0;
      let lambda = full.dot(&g);
      for i in (0..n).filter(|i| !support.contains(i)) {
        assert!(g[i] >= lambda - 10.0 * kkt_tolerance(cov));
      }
      assert_abs_diff_eq!(
        res.sample.annualized_volatility,
        stats.annualized_volatility(full.as_slice().unwrap(), 252.0),
        epsilon = 1e-9
      );
    }
  }

  #[test]
  fn refinement_fixes_a_poor_start() {
    let stats = AssetStatistics::from_parts(
      array![0.0, 0.0, 0.0],
      array![[1e-4, 0.0, 0.0], [0.0, 4e-4, 0.0], [0.0, 0.0, 9e-2]],
    )
    .unwrap();
    let cov = stats.covariance();
    let tol = kkt_tolerance(cov);
    let start = array![0.0, 0.0, 1.0];
    assert!(kkt_violation(cov, &start) > tol);

    let refined = refine_on_simplex(cov, start, 20_000, tol);
    assert!(refined.violation <= tol);
    // uncorrelated: w_i ∝ 1/σᵢ²
    let inv = [1e4, 2.5e3, 1.0 / 9e-2];
    let total: f64 = inv.iter().sum();
    for (w, v) in refined.weights.iter().zip(inv) {
      assert_abs_diff_eq!(*w, v / total, epsilon = 1e-6);
    }
  }

  #[test]
  fn projection_lands_on_the_simplex() {
    let p = project_onto_simplex(&array![0.5, 0.5, 0.5]);
    for v in p.iter() {
      assert_abs_diff_eq!(*v, 1.0 / 3.0, epsilon = 1e-12);
    }
    assert_eq!(project_onto_simplex(&array![2.0, 0.0]), array![1.0, 0.0]);
    let q = project_onto_simplex(&array![0.3, -1.0, 0.9]);
    assert_abs_diff_eq!(q.sum(), 1.0, epsilon = 1e-12);
    assert_eq!(q[1], 0.0);
  }

  #[test]
  fn softmax_maps_onto_the_simplex() {
    let w = softmax(&[0.0, 1.0, -2.0]);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert!(w[1] > w[0] && w[0] > w[2]);
    assert_eq!(softmax(&[0.0, 0.0]), vec![0.5, 0.5]);
  }
}
