//! # Monte Carlo Sampler
//!
//! $$
//! w_i=\frac{u_i}{\sum_{j=1}^N u_j},\qquad u_i\overset{\text{iid}}{\sim}\mathcal U(0,1)
//! $$
//!
//! Random long-only allocations evaluated for return, volatility and Sharpe ratio.
//! Each trial owns an RNG derived from the run seed and its index, so results do
//! not depend on how rayon schedules the trials.

use impl_new_derive::ImplNew;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Dirichlet;
use rand_distr::Distribution;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::stats::AssetStatistics;
use super::types::PortfolioSample;
use super::types::SampleOrigin;
use super::types::SampleSet;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

const SEED_STRIDE: u64 = 0xD134_2543_DE82_EF95;
const MIN_DRAW_SUM: f64 = 1e-12;

/// How raw allocations are drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
  /// Independent uniforms normalized by their sum. Biased towards balanced
  /// allocations.
  #[default]
  NormalizedUniform,
  /// Symmetric Dirichlet(1), uniform over the simplex.
  Dirichlet,
}

enum WeightDraw {
  Uniform,
  Dirichlet(Dirichlet<f64>),
}

impl WeightDraw {
  fn new(scheme: WeightScheme, n: usize) -> Result<Self> {
    match scheme {
      WeightScheme::Dirichlet if n >= 2 => Dirichlet::new_with_size(1.0, n)
        .map(Self::Dirichlet)
        .map_err(|e| PortfolioError::invalid(format!("dirichlet: {e}"))),
      _ => Ok(Self::Uniform),
    }
  }

  fn raw(&self, n: usize, rng: &mut StdRng) -> Vec<f64> {
    loop {
      let draw: Vec<f64> = match self {
        Self::Uniform => (0..n).map(|_| rng.gen::<f64>()).collect(),
        Self::Dirichlet(d) => d.sample(rng),
      };
      if draw.iter().sum::<f64>() > MIN_DRAW_SUM {
        return draw;
      }
    }
  }
}

/// RNG for trial `index` of a run seeded with `seed`.
pub fn trial_rng(seed: u64, index: usize) -> StdRng {
  StdRng::seed_from_u64(seed.wrapping_add(SEED_STRIDE.wrapping_mul((index as u64).wrapping_add(1))))
}

/// Monte Carlo generator of evaluated long-only portfolios.
#[derive(ImplNew, Clone, Debug)]
pub struct MonteCarloSampler {
  /// Number of trials.
  pub sample_count: usize,
  /// Annualized risk-free rate used in the Sharpe ratio.
  pub risk_free_rate: f64,
  /// Annualization factor (252 for daily data).
  pub periods_per_year: f64,
  /// Allocation generator.
  pub weight_scheme: WeightScheme,
  /// Fixed seed for bit-reproducible output; `None` draws one from the thread RNG.
  pub seed: Option<u64>,
}

impl MonteCarloSampler {
  /// Draw `sample_count` allocations and evaluate each against `stats`.
  ///
  /// Zero-volatility trials are kept with an undefined Sharpe ratio and logged.
  #[tracing::instrument(skip_all, fields(samples = self.sample_count, assets = stats.n_assets()))]
  pub fn sample(&self, stats: &AssetStatistics, assets: &[String]) -> Result<SampleSet> {
    let n = stats.n_assets();
    if self.sample_count == 0 {
      return Err(PortfolioError::invalid("sample_count must be positive"));
    }
    if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
      return Err(PortfolioError::invalid("periods_per_year must be positive"));
    }
    if !self.risk_free_rate.is_finite() {
      return Err(PortfolioError::invalid("risk_free_rate must be finite"));
    }
    if assets.len() != n {
      return Err(PortfolioError::invalid(format!(
        "{} asset labels for {n} assets",
        assets.len()
      )));
    }

    let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let draw = WeightDraw::new(self.weight_scheme, n)?;
    debug!(seed, scheme = ?self.weight_scheme, "sampling portfolios");

    let samples = (0..self.sample_count)
      .into_par_iter()
      .map(|index| {
        let mut rng = trial_rng(seed, index);
        let weights = WeightVector::normalized(draw.raw(n, &mut rng))?;
        Ok(PortfolioSample::evaluate(
          SampleOrigin::Simulated(index),
          weights,
          stats,
          self.risk_free_rate,
          self.periods_per_year,
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    let set = SampleSet::new(assets.to_vec(), samples)?;
    let degenerate = set.degenerate_count();
    if degenerate > 0 {
      warn!(degenerate, "zero-volatility samples excluded from Sharpe ranking");
    }
    Ok(set)
  }
}
