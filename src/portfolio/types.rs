//! # Portfolio Types
//!
//! $$
//! \mathbf w\in\Delta^{N-1}=\{\mathbf w\in[0,1]^N:\ \mathbf 1^\top\mathbf w=1\},\qquad
//! S=\frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Weight vectors, evaluated portfolio records and sample collections.

use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use super::stats::AssetStatistics;
use crate::error::PortfolioError;
use crate::error::Result;

/// Tolerance on the unit-sum and `[0, 1]` bound checks.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Volatility at or below which the Sharpe ratio is treated as undefined.
pub const MIN_VOLATILITY: f64 = 1e-15;

/// Long-only allocation fractions summing to one.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
  /// Validate and wrap a weight vector.
  pub fn new(weights: Vec<f64>) -> Result<Self> {
    if weights.is_empty() {
      return Err(PortfolioError::invalid("weight vector is empty"));
    }
    if let Some(i) = weights
      .iter()
      .position(|w| !w.is_finite() || *w < -WEIGHT_TOLERANCE || *w > 1.0 + WEIGHT_TOLERANCE)
    {
      return Err(PortfolioError::invalid(format!(
        "weight {i} = {} outside [0, 1]",
        weights[i]
      )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
      return Err(PortfolioError::invalid(format!(
        "weights sum to {sum}, expected 1"
      )));
    }
    Ok(Self(weights))
  }

  /// Equal allocation `1/n` across `n` assets.
  pub fn equal(n: usize) -> Result<Self> {
    Self::new(vec![1.0 / n as f64; n])
  }

  /// Normalize non-negative raw values by their sum.
  pub(crate) fn normalized(raw: Vec<f64>) -> Result<Self> {
    let sum: f64 = raw.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
      return Err(PortfolioError::invalid("cannot normalize weights with non-positive sum"));
    }
    Self::new(raw.into_iter().map(|w| w / sum).collect())
  }

  /// Borrow the weights.
  pub fn as_slice(&self) -> &[f64] {
    &self.0
  }

  /// Unwrap into the underlying vector.
  pub fn into_inner(self) -> Vec<f64> {
    self.0
  }
}

impl Deref for WeightVector {
  type Target = [f64];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

/// Where a sample came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SampleOrigin {
  /// Monte Carlo trial, by generation index.
  Simulated(usize),
  /// Analytical minimum-volatility solution.
  Optimized,
}

impl fmt::Display for SampleOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SampleOrigin::Simulated(i) => write!(f, "sample #{i}"),
      SampleOrigin::Optimized => write!(f, "optimizer result"),
    }
  }
}

/// Evaluated portfolio: weights with annualized return, volatility and Sharpe ratio,
/// plus tail-risk figures once augmented by the risk engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioSample {
  /// Provenance and generation order.
  pub origin: SampleOrigin,
  /// Allocation.
  pub weights: WeightVector,
  /// `μᵀw × periods_per_year`.
  pub annualized_return: f64,
  /// `√(wᵀΣw × periods_per_year)`.
  pub annualized_volatility: f64,
  /// `None` when the volatility is zero.
  pub sharpe_ratio: Option<f64>,
  /// Loss threshold at the configured confidence, positive for a loss.
  pub value_at_risk: Option<f64>,
  /// Mean of the worst tail returns, typically negative.
  pub expected_shortfall: Option<f64>,
  /// `expected_shortfall × portfolio_size_dollars`.
  pub expected_shortfall_dollars: Option<f64>,
}

impl PortfolioSample {
  /// Evaluate a weight vector against the asset statistics.
  ///
  /// `risk_free_rate` is annualized and is subtracted from the annualized return.
  pub fn evaluate(
    origin: SampleOrigin,
    weights: WeightVector,
    stats: &AssetStatistics,
    risk_free_rate: f64,
    periods_per_year: f64,
  ) -> Self {
    let annualized_return = stats.annualized_return(&weights, periods_per_year);
    let annualized_volatility = stats.annualized_volatility(&weights, periods_per_year);
    let sharpe_ratio = (annualized_volatility > MIN_VOLATILITY)
      .then(|| (annualized_return - risk_free_rate) / annualized_volatility);

    Self {
      origin,
      weights,
      annualized_return,
      annualized_volatility,
      sharpe_ratio,
      value_at_risk: None,
      expected_shortfall: None,
      expected_shortfall_dollars: None,
    }
  }

  /// Sharpe ratio, or [`PortfolioError::DegenerateSample`] for a zero-volatility allocation.
  pub fn sharpe(&self) -> Result<f64> {
    self.sharpe_ratio.ok_or_else(|| PortfolioError::DegenerateSample {
      sample: self.origin.to_string(),
    })
  }

  /// Whether the Sharpe ratio is undefined.
  pub fn is_degenerate(&self) -> bool {
    self.sharpe_ratio.is_none()
  }

  /// Whether VaR/ES have been attached.
  pub fn has_tail_risk(&self) -> bool {
    self.expected_shortfall.is_some() && self.expected_shortfall_dollars.is_some()
  }
}

/// Ordered collection of evaluated samples over a fixed asset universe.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleSet {
  assets: Vec<String>,
  samples: Vec<PortfolioSample>,
}

impl SampleSet {
  /// Wrap samples; every weight vector must match the asset count.
  pub fn new(assets: Vec<String>, samples: Vec<PortfolioSample>) -> Result<Self> {
    if let Some(s) = samples.iter().find(|s| s.weights.len() != assets.len()) {
      return Err(PortfolioError::invalid(format!(
        "{} has {} weights for {} assets",
        s.origin,
        s.weights.len(),
        assets.len()
      )));
    }
    Ok(Self { assets, samples })
  }

  /// Asset identifiers in weight order.
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Samples in generation order.
  pub fn samples(&self) -> &[PortfolioSample] {
    &self.samples
  }

  /// Iterate over samples in generation order.
  pub fn iter(&self) -> std::slice::Iter<'_, PortfolioSample> {
    self.samples.iter()
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  /// Number of zero-volatility samples.
  pub fn degenerate_count(&self) -> usize {
    self.samples.iter().filter(|s| s.is_degenerate()).count()
  }

  /// Whether every sample carries VaR/ES.
  pub fn is_augmented(&self) -> bool {
    !self.samples.is_empty() && self.samples.iter().all(PortfolioSample::has_tail_risk)
  }

  /// Largest annualized volatility in the set.
  pub fn max_volatility(&self) -> Option<f64> {
    self
      .samples
      .iter()
      .map(|s| s.annualized_volatility)
      .max_by(|a, b| a.total_cmp(b))
  }

  /// Largest annualized volatility, floored at 1.0: the upper bound offered when
  /// asking an investor for a volatility limit.
  pub fn volatility_ceiling(&self) -> f64 {
    self.max_volatility().unwrap_or(0.0).max(1.0)
  }

  /// Most negative dollar expected shortfall in the set.
  pub fn worst_expected_shortfall_dollars(&self) -> Option<f64> {
    self
      .samples
      .iter()
      .filter_map(|s| s.expected_shortfall_dollars)
      .min_by(|a, b| a.total_cmp(b))
  }
}

impl<'a> IntoIterator for &'a SampleSet {
  type Item = &'a PortfolioSample;
  type IntoIter = std::slice::Iter<'a, PortfolioSample>;

  fn into_iter(self) -> Self::IntoIter {
    self.samples.iter()
  }
}
