//! # Portfolio Engine
//!
//! $$
//! (\hat\mu,\hat\Sigma)\to\mathcal S\to\mathcal S^{\mathrm{ES}}\to\mathcal F\to s^\*,
//! \qquad (\hat\mu,\hat\Sigma)\to\mathbf w_{\min\sigma}
//! $$
//!
//! Explicit pipeline: every stage takes the previous stage's output as an
//! argument and returns a new value. The engine holds only its configuration.

use tracing::info;

use super::data::ReturnMatrix;
use super::optimizers::OptimizedPortfolio;
use super::optimizers::OptimizerConfig;
use super::optimizers::optimize_min_volatility;
use super::risk::RiskMetricEngine;
use super::sampler::MonteCarloSampler;
use super::selector::FeasibleSet;
use super::selector::Objective;
use super::selector::RiskConstraint;
use super::selector::feasible_set;
use super::selector::select;
use super::stats::AssetStatistics;
use super::types::PortfolioSample;
use super::types::SampleSet;
use crate::config::PortfolioConfig;
use crate::error::Result;

/// Everything produced by [`PortfolioEngine::run`].
#[derive(Clone, Debug)]
pub struct PortfolioRun {
  pub statistics: AssetStatistics,
  /// Sample set with VaR/ES attached.
  pub samples: SampleSet,
  /// Highest-return sample satisfying the configured constraint.
  pub selected: PortfolioSample,
  /// Highest-Sharpe sample over the whole set.
  pub max_sharpe: PortfolioSample,
  /// Lowest-volatility sample over the whole set.
  pub min_volatility: PortfolioSample,
  /// Analytical minimum-volatility allocation with VaR/ES attached.
  pub optimized: OptimizedPortfolio,
}

/// Single entry point for the sampling, risk, selection and optimization stages.
#[derive(Clone, Debug)]
pub struct PortfolioEngine {
  config: PortfolioConfig,
}

impl PortfolioEngine {
  /// Construct an engine from a validated configuration.
  pub fn new(config: PortfolioConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioConfig {
    &self.config
  }

  pub fn sampler(&self) -> MonteCarloSampler {
    MonteCarloSampler::new(
      self.config.sample_count,
      self.config.risk_free_rate,
      self.config.periods_per_year,
      self.config.weight_scheme,
      self.config.seed,
    )
  }

  pub fn risk_engine(&self) -> RiskMetricEngine {
    RiskMetricEngine::new(
      self.config.confidence_level,
      self.config.portfolio_size_dollars,
      self.config.risk_resolution,
      self.config.holding_period_days,
    )
  }

  pub fn optimizer_config(&self) -> OptimizerConfig {
    OptimizerConfig::new(
      self.config.optimizer_max_iters,
      self.config.optimizer_tolerance,
      self.config.risk_free_rate,
      self.config.periods_per_year,
    )
  }

  pub fn constraint(&self) -> RiskConstraint {
    self.config.risk_constraint()
  }

  /// Mean vector and covariance of `matrix`.
  pub fn statistics(&self, matrix: &ReturnMatrix) -> Result<AssetStatistics> {
    AssetStatistics::estimate(matrix)
  }

  /// Draw and evaluate the configured number of allocations.
  pub fn sample(&self, stats: &AssetStatistics, assets: &[String]) -> Result<SampleSet> {
    self.sampler().sample(stats, assets)
  }

  /// Attach VaR/ES to every sample.
  pub fn augment(&self, samples: &SampleSet, matrix: &ReturnMatrix) -> Result<SampleSet> {
    self.risk_engine().augment(samples, matrix)
  }

  /// Samples meeting the configured constraint.
  pub fn feasible<'a>(&self, samples: &'a SampleSet) -> Result<FeasibleSet<'a>> {
    feasible_set(samples, &self.constraint())
  }

  /// Highest-return feasible sample.
  pub fn select<'a>(&self, samples: &'a SampleSet) -> Result<&'a PortfolioSample> {
    self.feasible(samples)?.select(Objective::MaxReturn)
  }

  /// Best sample over the unfiltered set.
  pub fn select_unconstrained<'a>(
    &self,
    samples: &'a SampleSet,
    objective: Objective,
  ) -> Result<&'a PortfolioSample> {
    select(samples, objective)
  }

  /// Analytical minimum-volatility portfolio.
  pub fn optimize(&self, stats: &AssetStatistics) -> Result<OptimizedPortfolio> {
    optimize_min_volatility(stats, &self.optimizer_config())
  }

  /// Run every stage, stopping at the first failure.
  pub fn run(&self, matrix: &ReturnMatrix) -> Result<PortfolioRun> {
    let statistics = self.statistics(matrix)?;
    let raw = self.sample(&statistics, matrix.assets())?;
    let samples = self.augment(&raw, matrix)?;

    let selected = self.select(&samples)?.clone();
    let max_sharpe = self.select_unconstrained(&samples, Objective::MaxSharpe)?.clone();
    let min_volatility = self
      .select_unconstrained(&samples, Objective::MinVolatility)?
      .clone();

    let mut optimized = self.optimize(&statistics)?;
    optimized.sample = self.risk_engine().attach(matrix, &optimized.sample)?;

    info!(
      samples = samples.len(),
      selected = %selected.origin,
      optimized_volatility = optimized.sample.annualized_volatility,
      "run complete"
    );

    Ok(PortfolioRun {
      statistics,
      samples,
      selected,
      max_sharpe,
      min_volatility,
      optimized,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ConstraintKind;
  use crate::error::PortfolioError;
  use crate::portfolio::testing::synthetic_matrix;
  use crate::portfolio::types::SampleOrigin;

  fn config() -> PortfolioConfig {
    let mut cfg = PortfolioConfig::new(0.02, 0.95, 100_000.0, 20_000.0, 0.5);
    cfg.sample_count = 500;
    cfg.seed = Some(17);
    cfg
  }

  #[test]
  fn rejects_invalid_configuration() {
    let mut cfg = config();
    cfg.confidence_level = 0.0;
    assert!(PortfolioEngine::new(cfg).unwrap_err().is_input_validation());
  }

  #[test]
  fn run_threads_every_stage() {
    let matrix = synthetic_matrix(4, 800, 3);
    let engine = PortfolioEngine::new(config()).unwrap();
    let run = engine.run(&matrix).unwrap();

    assert_eq!(run.samples.len(), 500);
    assert!(run.samples.is_augmented());
    assert!(run.selected.expected_shortfall_dollars.unwrap() >= -20_000.0);
    assert!(run.optimized.sample.has_tail_risk());
    assert_eq!(run.optimized.sample.origin, SampleOrigin::Optimized);
    assert!(
      run.optimized.sample.annualized_volatility
        <= run.min_volatility.annualized_volatility + 1e-9
    );
    assert!(run.max_sharpe.sharpe().unwrap() >= run.selected.sharpe().unwrap());
  }

  #[test]
  fn run_is_reproducible_with_seed() {
    let matrix = synthetic_matrix(3, 600, 8);
    let engine = PortfolioEngine::new(config()).unwrap();
    let a = engine.run(&matrix).unwrap();
    let b = engine.run(&matrix).unwrap();
    assert_eq!(a.samples, b.samples);
    assert_eq!(a.selected, b.selected);
  }

  #[test]
  fn tight_volatility_limit_is_infeasible() {
    let matrix = synthetic_matrix(3, 600, 8);
    let mut cfg = config();
    cfg.constraint = ConstraintKind::Volatility;
    cfg.max_volatility = 1e-6;
    let engine = PortfolioEngine::new(cfg).unwrap();

    assert!(matches!(
      engine.run(&matrix),
      Err(PortfolioError::Infeasible { .. })
    ));
  }
}
