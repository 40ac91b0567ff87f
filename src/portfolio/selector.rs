//! # Feasibility & Selection
//!
//! $$
//! \mathcal F=\{s\in\mathcal S:\ \mathrm{ES}^{\$}_s\ge -D_{\max}\}
//! \quad\text{or}\quad
//! \mathcal F=\{s\in\mathcal S:\ \sigma_s\le\sigma_{\max}\},\qquad
//! s^\*=\arg\max_{s\in\mathcal F}\mu_s
//! $$
//!
//! Constraint filtering over a sample set and deterministic arg-max/arg-min
//! selection. Ties are resolved in favour of the earliest generated sample.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::types::PortfolioSample;
use super::types::SampleSet;
use crate::error::PortfolioError;
use crate::error::Result;

/// What the selector maximizes or minimizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
  /// Highest annualized return.
  #[default]
  MaxReturn,
  /// Highest Sharpe ratio; degenerate samples are skipped.
  MaxSharpe,
  /// Lowest annualized volatility.
  MinVolatility,
}

/// Investor risk limit applied to every sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum RiskConstraint {
  /// Dollar expected shortfall must not lose more than the drawdown budget.
  ExpectedShortfallDollars { max_drawdown_dollars: f64 },
  /// Annualized volatility must not exceed the limit.
  Volatility { max_volatility: f64 },
}

impl RiskConstraint {
  /// Whether `sample` satisfies the limit.
  ///
  /// The dollar-ES limit needs augmented samples and reports a validation error
  /// otherwise.
  pub fn admits(&self, sample: &PortfolioSample) -> Result<bool> {
    match *self {
      RiskConstraint::ExpectedShortfallDollars {
        max_drawdown_dollars,
      } => {
        let es = sample.expected_shortfall_dollars.ok_or_else(|| {
          PortfolioError::invalid(format!(
            "{} has no expected shortfall; augment the sample set first",
            sample.origin
          ))
        })?;
        Ok(es >= -max_drawdown_dollars)
      }
      RiskConstraint::Volatility { max_volatility } => {
        Ok(sample.annualized_volatility <= max_volatility)
      }
    }
  }

  fn validate(&self) -> Result<()> {
    let limit = match *self {
      RiskConstraint::ExpectedShortfallDollars {
        max_drawdown_dollars,
      } => max_drawdown_dollars,
      RiskConstraint::Volatility { max_volatility } => max_volatility,
    };
    if limit.is_finite() && limit > 0.0 {
      Ok(())
    } else {
      Err(PortfolioError::invalid(format!("{self} must be positive")))
    }
  }
}

impl fmt::Display for RiskConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RiskConstraint::ExpectedShortfallDollars {
        max_drawdown_dollars,
      } => write!(f, "expected shortfall >= -${max_drawdown_dollars:.2}"),
      RiskConstraint::Volatility { max_volatility } => {
        write!(f, "volatility <= {max_volatility:.4}")
      }
    }
  }
}

/// Samples that satisfy a constraint, borrowed from their set in generation order.
#[derive(Clone, Debug)]
pub struct FeasibleSet<'a> {
  constraint: RiskConstraint,
  samples: Vec<&'a PortfolioSample>,
}

impl<'a> FeasibleSet<'a> {
  /// Constraint the set was filtered with.
  pub fn constraint(&self) -> RiskConstraint {
    self.constraint
  }

  /// Feasible samples in generation order.
  pub fn samples(&self) -> &[&'a PortfolioSample] {
    &self.samples
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  /// Best feasible sample under `objective`, or [`PortfolioError::Infeasible`].
  pub fn select(&self, objective: Objective) -> Result<&'a PortfolioSample> {
    if self.samples.is_empty() {
      warn!(constraint = %self.constraint, "no feasible portfolio");
      return Err(PortfolioError::infeasible(self.constraint.to_string()));
    }
    select(self.samples.iter().copied(), objective)
  }
}

/// Filter `set` against `constraint` without modifying it.
#[tracing::instrument(skip_all, fields(samples = set.len(), constraint = %constraint))]
pub fn feasible_set<'a>(set: &'a SampleSet, constraint: &RiskConstraint) -> Result<FeasibleSet<'a>> {
  constraint.validate()?;
  let mut samples = Vec::new();
  for sample in set.iter() {
    if constraint.admits(sample)? {
      samples.push(sample);
    }
  }
  debug!(feasible = samples.len(), "filtered sample set");

  Ok(FeasibleSet {
    constraint: *constraint,
    samples,
  })
}

fn score(sample: &PortfolioSample, objective: Objective) -> Option<f64> {
  match objective {
    Objective::MaxReturn => Some(sample.annualized_return),
    Objective::MaxSharpe => sample.sharpe_ratio,
    Objective::MinVolatility => Some(-sample.annualized_volatility),
  }
}

/// Best sample under `objective`; the first sample reaching the optimum wins.
pub fn select<'a, I>(samples: I, objective: Objective) -> Result<&'a PortfolioSample>
where
  I: IntoIterator<Item = &'a PortfolioSample>,
{
  let mut seen = false;
  let mut best: Option<(&'a PortfolioSample, f64)> = None;
  for sample in samples {
    seen = true;
    let Some(value) = score(sample, objective) else {
      continue;
    };
    match best {
      Some((_, current)) if value <= current => {}
      _ => best = Some((sample, value)),
    }
  }

  match best {
    Some((sample, _)) => Ok(sample),
    None if !seen => Err(PortfolioError::invalid("cannot select from an empty sample set")),
    None => {
      warn!(?objective, "every sample is degenerate");
      Err(PortfolioError::infeasible("finite Sharpe ratio"))
    }
  }
}

/// Upper envelope of return over `buckets` equal-width volatility bins.
///
/// Returns at most one sample per bin, ordered by volatility, keeping only
/// samples whose return beats every lower-volatility point already kept.
pub fn efficient_frontier(set: &SampleSet, buckets: usize) -> Vec<&PortfolioSample> {
  let Some(max_vol) = set.max_volatility() else {
    return Vec::new();
  };
  let min_vol = set
    .iter()
    .map(|s| s.annualized_volatility)
    .fold(f64::INFINITY, f64::min);
  let buckets = buckets.max(1);
  let width = (max_vol - min_vol) / buckets as f64;

  let mut best: Vec<Option<&PortfolioSample>> = vec![None; buckets];
  for sample in set.iter() {
    let bin = if width > 0.0 {
      (((sample.annualized_volatility - min_vol) / width) as usize).min(buckets - 1)
    } else {
      0
    };
    match best[bin] {
      Some(b) if sample.annualized_return <= b.annualized_return => {}
      _ => best[bin] = Some(sample),
    }
  }

  let mut frontier = Vec::new();
  let mut top = f64::NEG_INFINITY;
  for sample in best.into_iter().flatten() {
    if sample.annualized_return > top {
      top = sample.annualized_return;
      frontier.push(sample);
    }
  }
  frontier
}

#[cfg(test)]
mod tests {
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::data::Resolution;
  use crate::portfolio::risk::RiskMetricEngine;
  use crate::portfolio::sampler::MonteCarloSampler;
  use crate::portfolio::sampler::WeightScheme;
  use crate::portfolio::stats::AssetStatistics;
  use crate::portfolio::testing::synthetic_matrix;
  use crate::portfolio::types::SampleOrigin;
  use crate::portfolio::types::WeightVector;

  fn augmented_set() -> SampleSet {
    let matrix = synthetic_matrix(3, 800, 21);
    let stats = AssetStatistics::estimate(&matrix).unwrap();
    let set = MonteCarloSampler::new(300, 0.02, 252.0, WeightScheme::NormalizedUniform, Some(5))
      .sample(&stats, matrix.assets())
      .unwrap();
    RiskMetricEngine::new(0.95, 100_000.0, Resolution::Monthly, None)
      .augment(&set, &matrix)
      .unwrap()
  }

  fn fixed(origin: usize, ret: f64, vol: f64) -> PortfolioSample {
    PortfolioSample {
      origin: SampleOrigin::Simulated(origin),
      weights: WeightVector::equal(1).unwrap(),
      annualized_return: ret,
      annualized_volatility: vol,
      sharpe_ratio: (vol > 0.0).then(|| ret / vol),
      value_at_risk: None,
      expected_shortfall: None,
      expected_shortfall_dollars: None,
    }
  }

  #[test]
  #[traced_test]
  fn drawdown_below_every_sample_is_infeasible() {
    let set = augmented_set();
    let worst_loss = set
      .iter()
      .filter_map(|s| s.expected_shortfall_dollars)
      .fold(f64::NEG_INFINITY, f64::max);
    // Every sample loses more than this in the tail.
    let budget = (-worst_loss) / 2.0;
    assert!(budget > 0.0);

    let constraint = RiskConstraint::ExpectedShortfallDollars {
      max_drawdown_dollars: budget,
    };
    let feasible = feasible_set(&set, &constraint).unwrap();

    assert!(feasible.is_empty());
    assert!(matches!(
      feasible.select(Objective::MaxReturn),
      Err(PortfolioError::Infeasible { .. })
    ));
    assert!(logs_contain("no feasible portfolio"));
  }

  #[test]
  fn volatility_above_maximum_keeps_full_set() {
    let set = augmented_set();
    let constraint = RiskConstraint::Volatility {
      max_volatility: set.max_volatility().unwrap() + 1e-6,
    };
    let feasible = feasible_set(&set, &constraint).unwrap();

    assert_eq!(feasible.len(), set.len());
    for (a, b) in feasible.samples().iter().zip(set.iter()) {
      assert!(std::ptr::eq(*a, b));
    }
  }

  #[test]
  fn max_return_is_the_feasible_argmax() {
    let set = augmented_set();
    let constraint = RiskConstraint::ExpectedShortfallDollars {
      max_drawdown_dollars: 100_000.0,
    };
    let feasible = feasible_set(&set, &constraint).unwrap();
    let best = feasible.select(Objective::MaxReturn).unwrap();

    assert!(feasible
      .samples()
      .iter()
      .all(|s| s.annualized_return <= best.annualized_return));
  }

  #[test]
  fn ties_resolve_to_generation_order() {
    let samples = vec![fixed(0, 0.1, 0.2), fixed(1, 0.3, 0.2), fixed(2, 0.3, 0.1)];
    let best = select(&samples, Objective::MaxReturn).unwrap();
    assert_eq!(best.origin, SampleOrigin::Simulated(1));

    let calm = select(&samples, Objective::MinVolatility).unwrap();
    assert_eq!(calm.origin, SampleOrigin::Simulated(2));
  }

  #[test]
  fn max_sharpe_skips_degenerate_samples() {
    let samples = vec![fixed(0, 0.5, 0.0), fixed(1, 0.1, 0.2), fixed(2, 0.2, 0.2)];
    let best = select(&samples, Objective::MaxSharpe).unwrap();
    assert_eq!(best.origin, SampleOrigin::Simulated(2));

    let all_flat = vec![fixed(0, 0.5, 0.0)];
    assert!(matches!(
      select(&all_flat, Objective::MaxSharpe),
      Err(PortfolioError::Infeasible { .. })
    ));
  }

  #[test]
  fn empty_input_is_a_validation_error() {
    let none: Vec<PortfolioSample> = Vec::new();
    assert!(select(&none, Objective::MaxReturn)
      .unwrap_err()
      .is_input_validation());
  }

  #[test]
  fn es_constraint_requires_augmented_samples() {
    let set = SampleSet::new(vec!["A0".into()], vec![fixed(0, 0.1, 0.2)]).unwrap();
    let constraint = RiskConstraint::ExpectedShortfallDollars {
      max_drawdown_dollars: 1_000.0,
    };
    assert!(feasible_set(&set, &constraint).unwrap_err().is_input_validation());
  }

  #[test]
  fn frontier_is_increasing_in_return_and_volatility() {
    let set = augmented_set();
    let frontier = efficient_frontier(&set, 20);

    assert!(!frontier.is_empty());
    for pair in frontier.windows(2) {
      assert!(pair[1].annualized_volatility > pair[0].annualized_volatility);
      assert!(pair[1].annualized_return > pair[0].annualized_return);
    }
  }
}
