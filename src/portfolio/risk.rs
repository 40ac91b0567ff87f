//! # Tail Risk
//!
//! $$
//! \mathrm{VaR}_c=-q_{1-c}\left(R_p\right),\qquad
//! \mathrm{ES}_c=\frac1k\sum_{i=1}^{k}R_{p,(i)},\quad k=\left\lceil (1-c)\,n\right\rceil
//! $$
//!
//! Realized portfolio return series, historical Value-at-Risk and Expected
//! Shortfall, dollar and holding-period scaling.
//!
//! Square-root-of-time scaling assumes i.i.d. native-period returns; it is only
//! offered for native resolution and is not valid for resampled (weekly/monthly)
//! figures.

use impl_new_derive::ImplNew;
use rayon::prelude::*;
use serde::Serialize;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use tracing::debug;

use super::data::Resolution;
use super::data::ReturnMatrix;
use super::data::resample_sum;
use super::types::PortfolioSample;
use super::types::SampleSet;
use crate::error::PortfolioError;
use crate::error::Result;

/// Guard against floating error in `⌈·⌉` of tail counts, e.g. `(1 - 0.95) × 20`.
const COUNT_EPSILON: f64 = 1e-9;

fn check_confidence(confidence: f64) -> Result<()> {
  if confidence > 0.0 && confidence < 1.0 {
    Ok(())
  } else {
    Err(PortfolioError::invalid(format!(
      "confidence level must be in (0, 1), got {confidence}"
    )))
  }
}

/// Smallest sample size with a non-degenerate tail: `⌈1 / (1 − c)⌉`.
pub fn min_observations(confidence: f64) -> Result<usize> {
  check_confidence(confidence)?;
  Ok(((1.0 / (1.0 - confidence)) - COUNT_EPSILON).ceil().max(1.0) as usize)
}

/// Number of tail observations averaged by ES: `max(1, ⌈(1 − c) n⌉)`.
pub fn tail_size(confidence: f64, n: usize) -> usize {
  let k = ((1.0 - confidence) * n as f64 - COUNT_EPSILON).ceil();
  (k.max(1.0) as usize).min(n.max(1))
}

/// Linear-interpolation quantile of an ascending slice at probability `p`.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
  if sorted.len() == 1 {
    return sorted[0];
  }
  let z = p.clamp(0.0, 1.0);
  let pos = z * (sorted.len() as f64 - 1.0);
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  if lo == hi {
    sorted[lo]
  } else {
    let w = pos - lo as f64;
    sorted[lo] * (1.0 - w) + sorted[hi] * w
  }
}

fn sorted_tail_input(returns: &[f64], confidence: f64) -> Result<Vec<f64>> {
  let required = min_observations(confidence)?;
  if returns.len() < required {
    return Err(PortfolioError::InsufficientObservations {
      required,
      available: returns.len(),
    });
  }
  if returns.iter().any(|r| !r.is_finite()) {
    return Err(PortfolioError::invalid("return series contains non-finite values"));
  }
  let mut sorted = returns.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));
  Ok(sorted)
}

/// Historical VaR: the negated `(1 − c)`-quantile, positive for a loss.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> Result<f64> {
  let sorted = sorted_tail_input(returns, confidence)?;
  Ok(-quantile_sorted(&sorted, 1.0 - confidence))
}

/// Historical ES: mean of the worst `⌈(1 − c) n⌉` returns, signed (typically negative).
pub fn expected_shortfall(returns: &[f64], confidence: f64) -> Result<f64> {
  let sorted = sorted_tail_input(returns, confidence)?;
  let k = tail_size(confidence, sorted.len());
  Ok(sorted[..k].iter().sum::<f64>() / k as f64)
}

/// Gaussian VaR and ES for a return distribution with the given mean and volatility.
///
/// Returns `(var, es)` with VaR positive for a loss and ES signed like
/// [`expected_shortfall`].
pub fn parametric_var_es(mean: f64, volatility: f64, confidence: f64) -> Result<(f64, f64)> {
  check_confidence(confidence)?;
  if !(mean.is_finite() && volatility.is_finite() && volatility >= 0.0) {
    return Err(PortfolioError::invalid("mean and volatility must be finite, volatility >= 0"));
  }
  let std_normal = Normal::new(0.0, 1.0)
    .map_err(|e| PortfolioError::invalid(format!("normal distribution: {e}")))?;
  let alpha = 1.0 - confidence;
  let z = std_normal.inverse_cdf(alpha);
  let pdf_z = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();

  let var = -(mean + volatility * z);
  let es = mean - volatility * pdf_z / alpha;
  Ok((var, es))
}

/// Scale a native-period figure to a multi-day holding period by `√days`.
pub fn scale_to_holding_period(
  value: f64,
  holding_period_days: u32,
  resolution: Resolution,
) -> Result<f64> {
  if resolution != Resolution::Native {
    return Err(PortfolioError::invalid(format!(
      "square-root-of-time scaling needs native resolution, got {resolution:?}"
    )));
  }
  if holding_period_days == 0 {
    return Err(PortfolioError::invalid("holding period must be at least one day"));
  }
  Ok(value * f64::from(holding_period_days).sqrt())
}

/// Native-period portfolio returns `Σ_i w_i r_{t,i}`.
pub fn portfolio_returns(matrix: &ReturnMatrix, weights: &[f64]) -> Result<Vec<f64>> {
  if weights.len() != matrix.n_assets() {
    return Err(PortfolioError::invalid(format!(
      "{} weights for {} assets",
      weights.len(),
      matrix.n_assets()
    )));
  }
  Ok(
    matrix
      .returns()
      .rows()
      .into_iter()
      .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).sum())
      .collect(),
  )
}

/// Portfolio returns at `resolution`, summing native returns within each period.
pub fn portfolio_return_series(
  matrix: &ReturnMatrix,
  weights: &[f64],
  resolution: Resolution,
) -> Result<Vec<f64>> {
  let native = portfolio_returns(matrix, weights)?;
  Ok(resample_sum(matrix.dates(), &native, resolution))
}

/// Tail-risk figures for one allocation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TailRisk {
  /// Positive for a loss.
  pub value_at_risk: f64,
  /// Signed tail mean.
  pub expected_shortfall: f64,
  /// `expected_shortfall × portfolio_size_dollars`.
  pub expected_shortfall_dollars: f64,
  /// Length of the return series the figures came from.
  pub observations: usize,
}

/// Historical VaR/ES evaluator for a fixed confidence, portfolio size and resolution.
#[derive(ImplNew, Clone, Debug)]
pub struct RiskMetricEngine {
  /// Confidence level in `(0, 1)`.
  pub confidence_level: f64,
  /// Portfolio value used for dollar conversion.
  pub portfolio_size_dollars: f64,
  /// Resolution of the return series the tail is measured on.
  pub resolution: Resolution,
  /// Optional `√days` scaling, native resolution only.
  pub holding_period_days: Option<u32>,
}

impl RiskMetricEngine {
  /// Check parameters before any evaluation.
  pub fn validate(&self) -> Result<()> {
    check_confidence(self.confidence_level)?;
    if !(self.portfolio_size_dollars.is_finite() && self.portfolio_size_dollars > 0.0) {
      return Err(PortfolioError::invalid("portfolio size must be positive"));
    }
    if let Some(days) = self.holding_period_days {
      scale_to_holding_period(1.0, days, self.resolution)?;
    }
    Ok(())
  }

  /// VaR, ES and dollar ES for `weights`.
  pub fn tail_risk(&self, matrix: &ReturnMatrix, weights: &[f64]) -> Result<TailRisk> {
    self.validate()?;
    let series = portfolio_return_series(matrix, weights, self.resolution)?;
    let mut var = value_at_risk(&series, self.confidence_level)?;
    let mut es = expected_shortfall(&series, self.confidence_level)?;
    if let Some(days) = self.holding_period_days {
      var = scale_to_holding_period(var, days, self.resolution)?;
      es = scale_to_holding_period(es, days, self.resolution)?;
    }

    Ok(TailRisk {
      value_at_risk: var,
      expected_shortfall: es,
      expected_shortfall_dollars: es * self.portfolio_size_dollars,
      observations: series.len(),
    })
  }

  /// Copy of `sample` with tail-risk fields attached.
  pub fn attach(&self, matrix: &ReturnMatrix, sample: &PortfolioSample) -> Result<PortfolioSample> {
    let risk = self.tail_risk(matrix, &sample.weights)?;
    Ok(PortfolioSample {
      value_at_risk: Some(risk.value_at_risk),
      expected_shortfall: Some(risk.expected_shortfall),
      expected_shortfall_dollars: Some(risk.expected_shortfall_dollars),
      ..sample.clone()
    })
  }

  /// New sample set with VaR/ES attached to every sample, in the same order.
  #[tracing::instrument(skip_all, fields(samples = samples.len(), resolution = ?self.resolution))]
  pub fn augment(&self, samples: &SampleSet, matrix: &ReturnMatrix) -> Result<SampleSet> {
    self.validate()?;
    if samples.assets() != matrix.assets() {
      return Err(PortfolioError::invalid(
        "sample set and return matrix cover different assets",
      ));
    }

    // Fail fast on a short series instead of once per sample.
    let observations = resample_sum(
      matrix.dates(),
      &vec![0.0; matrix.n_periods()],
      self.resolution,
    )
    .len();
    let required = min_observations(self.confidence_level)?;
    if observations < required {
      return Err(PortfolioError::InsufficientObservations {
        required,
        available: observations,
      });
    }

    let augmented = samples
      .samples()
      .par_iter()
      .map(|s| self.attach(matrix, s))
      .collect::<Result<Vec<_>>>()?;
    debug!(observations, "attached tail risk");

    SampleSet::new(samples.assets().to_vec(), augmented)
  }
}
