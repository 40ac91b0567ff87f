//! # Configuration
//!
//! Run parameters loaded from an optional TOML file with `FRONTIER_*`
//! environment overrides, plus an interactive intake state machine.
//!
//! The risk-free rate has no default: it must be supplied by the caller.

pub mod intake;

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::PERIODS_PER_YEAR;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::portfolio::Resolution;
use crate::portfolio::RiskConstraint;
use crate::portfolio::WeightScheme;

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "FRONTIER";

/// Which investor limit filters the sample set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
  /// Dollar expected shortfall against `max_drawdown_dollars`.
  #[default]
  ExpectedShortfall,
  /// Annualized volatility against `max_volatility`.
  Volatility,
}

fn default_sample_count() -> usize {
  10_000
}

fn default_max_sample_count() -> usize {
  1_000_000
}

fn default_periods_per_year() -> f64 {
  PERIODS_PER_YEAR
}

fn default_optimizer_max_iters() -> u64 {
  20_000
}

fn default_optimizer_tolerance() -> f64 {
  1e-14
}

/// Parameters for one frontier run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
  /// Annualized risk-free rate (decimal).
  pub risk_free_rate: f64,
  /// Tail confidence level in `(0, 1)`.
  pub confidence_level: f64,
  /// Portfolio value in dollars.
  pub portfolio_size_dollars: f64,
  /// Largest acceptable dollar expected shortfall, in `(0, portfolio_size_dollars)`.
  pub max_drawdown_dollars: f64,
  /// Largest acceptable annualized volatility.
  pub max_volatility: f64,
  #[serde(default = "default_sample_count")]
  pub sample_count: usize,
  /// Upper bound on `sample_count`.
  #[serde(default = "default_max_sample_count")]
  pub max_sample_count: usize,
  #[serde(default)]
  pub seed: Option<u64>,
  #[serde(default = "default_periods_per_year")]
  pub periods_per_year: f64,
  /// Resolution the tail risk is measured at.
  #[serde(default)]
  pub risk_resolution: Resolution,
  /// `√days` scaling of VaR/ES, native resolution only.
  #[serde(default)]
  pub holding_period_days: Option<u32>,
  #[serde(default)]
  pub constraint: ConstraintKind,
  #[serde(default)]
  pub weight_scheme: WeightScheme,
  #[serde(default = "default_optimizer_max_iters")]
  pub optimizer_max_iters: u64,
  #[serde(default = "default_optimizer_tolerance")]
  pub optimizer_tolerance: f64,
}

impl PortfolioConfig {
  /// Configuration with the required values and defaults for the rest.
  pub fn new(
    risk_free_rate: f64,
    confidence_level: f64,
    portfolio_size_dollars: f64,
    max_drawdown_dollars: f64,
    max_volatility: f64,
  ) -> Self {
    Self {
      risk_free_rate,
      confidence_level,
      portfolio_size_dollars,
      max_drawdown_dollars,
      max_volatility,
      sample_count: default_sample_count(),
      max_sample_count: default_max_sample_count(),
      seed: None,
      periods_per_year: default_periods_per_year(),
      risk_resolution: Resolution::default(),
      holding_period_days: None,
      constraint: ConstraintKind::default(),
      weight_scheme: WeightScheme::default(),
      optimizer_max_iters: default_optimizer_max_iters(),
      optimizer_tolerance: default_optimizer_tolerance(),
    }
  }

  /// Load from `path` (if given) and `FRONTIER_*` environment variables, then validate.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
      builder = builder.add_source(::config::File::from(path));
    }

    let cfg: Self = builder
      .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
      .build()
      .and_then(|c| c.try_deserialize())
      .map_err(|e| PortfolioError::invalid(format!("configuration: {e}")))?;

    cfg.validate()?;
    Ok(cfg)
  }

  /// Reject any out-of-range value.
  pub fn validate(&self) -> Result<()> {
    if !self.risk_free_rate.is_finite() {
      return Err(PortfolioError::invalid("risk_free_rate must be finite"));
    }
    check_confidence_level(self.confidence_level)?;
    check_portfolio_size(self.portfolio_size_dollars)?;
    check_max_drawdown(self.max_drawdown_dollars, self.portfolio_size_dollars)?;
    check_max_volatility(self.max_volatility, None)?;

    if self.sample_count == 0 {
      return Err(PortfolioError::invalid("sample_count must be positive"));
    }
    if self.sample_count > self.max_sample_count {
      return Err(PortfolioError::invalid(format!(
        "sample_count {} exceeds the cap of {}",
        self.sample_count, self.max_sample_count
      )));
    }
    if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
      return Err(PortfolioError::invalid("periods_per_year must be positive"));
    }
    if let Some(days) = self.holding_period_days {
      if days == 0 {
        return Err(PortfolioError::invalid("holding_period_days must be at least 1"));
      }
      if self.risk_resolution != Resolution::Native {
        return Err(PortfolioError::invalid(
          "holding_period_days requires risk_resolution = native",
        ));
      }
    }
    if self.optimizer_max_iters == 0 {
      return Err(PortfolioError::invalid("optimizer_max_iters must be positive"));
    }
    if !(self.optimizer_tolerance.is_finite() && self.optimizer_tolerance > 0.0) {
      return Err(PortfolioError::invalid("optimizer_tolerance must be positive"));
    }
    Ok(())
  }

  /// The configured investor limit.
  pub fn risk_constraint(&self) -> RiskConstraint {
    match self.constraint {
      ConstraintKind::ExpectedShortfall => RiskConstraint::ExpectedShortfallDollars {
        max_drawdown_dollars: self.max_drawdown_dollars,
      },
      ConstraintKind::Volatility => RiskConstraint::Volatility {
        max_volatility: self.max_volatility,
      },
    }
  }
}

pub(crate) fn check_portfolio_size(size: f64) -> Result<()> {
  if size.is_finite() && size > 0.0 {
    Ok(())
  } else {
    Err(PortfolioError::invalid("portfolio size must be greater than 0"))
  }
}

pub(crate) fn check_confidence_level(c: f64) -> Result<()> {
  if c > 0.0 && c < 1.0 {
    Ok(())
  } else {
    Err(PortfolioError::invalid("confidence level must be between 0 and 1"))
  }
}

pub(crate) fn check_max_drawdown(max_drawdown: f64, portfolio_size: f64) -> Result<()> {
  if !(max_drawdown.is_finite() && max_drawdown > 0.0) {
    return Err(PortfolioError::invalid("maximum drawdown must be greater than 0"));
  }
  if max_drawdown >= portfolio_size {
    return Err(PortfolioError::invalid(
      "maximum drawdown must be smaller than the portfolio size",
    ));
  }
  Ok(())
}

pub(crate) fn check_max_volatility(max_volatility: f64, ceiling: Option<f64>) -> Result<()> {
  if !(max_volatility.is_finite() && max_volatility > 0.0) {
    return Err(PortfolioError::invalid("maximum volatility must be greater than 0"));
  }
  match ceiling {
    Some(c) if max_volatility > c => Err(PortfolioError::invalid(format!(
      "maximum volatility must be between 0 and {c:.2}"
    ))),
    _ => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn defaults_fill_optional_keys() {
    let cfg = PortfolioConfig::new(0.03, 0.95, 100_000.0, 5_000.0, 0.25);
    assert_eq!(cfg.sample_count, 10_000);
    assert_eq!(cfg.periods_per_year, 252.0);
    assert_eq!(cfg.risk_resolution, Resolution::Monthly);
    assert_eq!(cfg.constraint, ConstraintKind::ExpectedShortfall);
    assert!(cfg.validate().is_ok());
  }

  #[test]
  fn out_of_range_values_are_rejected() {
    let base = PortfolioConfig::new(0.03, 0.95, 100_000.0, 5_000.0, 0.25);

    let mut cfg = base.clone();
    cfg.confidence_level = 1.0;
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.max_drawdown_dollars = 100_000.0;
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.sample_count = 2_000_000;
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.holding_period_days = Some(10);
    assert!(cfg.validate().is_err());
    cfg.risk_resolution = Resolution::Native;
    assert!(cfg.validate().is_ok());

    let mut cfg = base;
    cfg.risk_free_rate = f64::NAN;
    assert!(cfg.validate().unwrap_err().is_input_validation());
  }

  #[test]
  fn constraint_kind_selects_limit() {
    let mut cfg = PortfolioConfig::new(0.0, 0.95, 10_000.0, 500.0, 0.2);
    assert_eq!(
      cfg.risk_constraint(),
      RiskConstraint::ExpectedShortfallDollars {
        max_drawdown_dollars: 500.0
      }
    );
    cfg.constraint = ConstraintKind::Volatility;
    assert_eq!(
      cfg.risk_constraint(),
      RiskConstraint::Volatility {
        max_volatility: 0.2
      }
    );
  }

  #[test]
  fn loads_file_then_environment() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
      file,
      r#"
risk_free_rate = 0.04
confidence_level = 0.95
portfolio_size_dollars = 250000.0
max_drawdown_dollars = 10000.0
max_volatility = 0.3
sample_count = 5000
risk_resolution = "weekly"
weight_scheme = "dirichlet"
seed = 7
"#
    )
    .unwrap();

    std::env::set_var("FRONTIER_OPTIMIZER_MAX_ITERS", "1234");
    let cfg = PortfolioConfig::load(Some(file.path())).unwrap();
    std::env::remove_var("FRONTIER_OPTIMIZER_MAX_ITERS");

    assert_eq!(cfg.risk_free_rate, 0.04);
    assert_eq!(cfg.sample_count, 5_000);
    assert_eq!(cfg.risk_resolution, Resolution::Weekly);
    assert_eq!(cfg.weight_scheme, WeightScheme::Dirichlet);
    assert_eq!(cfg.seed, Some(7));
    assert_eq!(cfg.optimizer_max_iters, 1_234);
  }

  #[test]
  fn missing_risk_free_rate_is_an_error() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
      file,
      "confidence_level = 0.95\nportfolio_size_dollars = 1000.0\nmax_drawdown_dollars = 100.0\nmax_volatility = 0.3"
    )
    .unwrap();

    let err = PortfolioConfig::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("risk_free_rate"));
  }
}
