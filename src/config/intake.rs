//! # Interactive Intake
//!
//! Investor parameters collected one answer at a time. Each answer is parsed and
//! range-checked on submission; a rejected answer leaves the same field pending.
//! Nothing is read from a terminal here, callers drive the machine with
//! [`ConfigIntake::submit`].

use std::fmt;

use super::PortfolioConfig;
use super::check_confidence_level;
use super::check_max_drawdown;
use super::check_max_volatility;
use super::check_portfolio_size;
use crate::error::PortfolioError;
use crate::error::Result;

/// Fields requested by the intake, in prompting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntakeField {
  PortfolioSize,
  ConfidenceLevel,
  MaxDrawdown,
  MaxVolatility,
  RiskFreeRate,
}

impl IntakeField {
  const ORDER: [IntakeField; 5] = [
    IntakeField::PortfolioSize,
    IntakeField::ConfidenceLevel,
    IntakeField::MaxDrawdown,
    IntakeField::MaxVolatility,
    IntakeField::RiskFreeRate,
  ];

  fn next(self) -> Option<Self> {
    let idx = Self::ORDER.iter().position(|f| *f == self)?;
    Self::ORDER.get(idx + 1).copied()
  }
}

impl fmt::Display for IntakeField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      IntakeField::PortfolioSize => "portfolio size",
      IntakeField::ConfidenceLevel => "confidence level",
      IntakeField::MaxDrawdown => "maximum drawdown",
      IntakeField::MaxVolatility => "maximum volatility",
      IntakeField::RiskFreeRate => "risk-free rate",
    };
    f.write_str(name)
  }
}

/// Where the intake stands.
#[derive(Clone, Debug, PartialEq)]
pub enum IntakeState {
  /// Waiting for an answer to `field`.
  Prompting(IntakeField),
  /// The last answer to `field` was refused; the field is asked again.
  Rejected { field: IntakeField, reason: String },
  /// Every field accepted and the configuration validated.
  Validated(Box<PortfolioConfig>),
}

#[derive(Clone, Debug, Default)]
struct Answers {
  portfolio_size: Option<f64>,
  confidence_level: Option<f64>,
  max_drawdown: Option<f64>,
  max_volatility: Option<f64>,
  risk_free_rate: Option<f64>,
}

/// State machine producing a validated [`PortfolioConfig`].
#[derive(Clone, Debug)]
pub struct ConfigIntake {
  base: Option<PortfolioConfig>,
  volatility_ceiling: Option<f64>,
  answers: Answers,
  state: IntakeState,
}

impl Default for ConfigIntake {
  fn default() -> Self {
    Self::new()
  }
}

impl ConfigIntake {
  pub fn new() -> Self {
    Self {
      base: None,
      volatility_ceiling: None,
      answers: Answers::default(),
      state: IntakeState::Prompting(IntakeField::PortfolioSize),
    }
  }

  /// Take non-prompted settings (sample count, seed, resolution, ...) from `base`.
  pub fn with_base(mut self, base: PortfolioConfig) -> Self {
    self.base = Some(base);
    self
  }

  /// Upper bound accepted for the maximum volatility, usually
  /// [`SampleSet::volatility_ceiling`](crate::portfolio::SampleSet::volatility_ceiling).
  pub fn with_volatility_ceiling(mut self, ceiling: f64) -> Self {
    self.volatility_ceiling = Some(ceiling);
    self
  }

  pub fn state(&self) -> &IntakeState {
    &self.state
  }

  /// Field currently awaiting an answer, `None` once validated.
  pub fn pending(&self) -> Option<IntakeField> {
    match &self.state {
      IntakeState::Prompting(field) | IntakeState::Rejected { field, .. } => Some(*field),
      IntakeState::Validated(_) => None,
    }
  }

  /// Question text for the pending field.
  pub fn prompt(&self) -> Option<String> {
    let field = self.pending()?;
    Some(match field {
      IntakeField::PortfolioSize => "Enter your total portfolio size in dollars: ".to_string(),
      IntakeField::ConfidenceLevel => {
        "Enter your desired confidence level for ES (0 < confidence_level < 1, e.g., 0.95): "
          .to_string()
      }
      IntakeField::MaxDrawdown => {
        "Enter the maximum drawdown (ES) you are willing to accept in dollars: ".to_string()
      }
      IntakeField::MaxVolatility => match self.volatility_ceiling {
        Some(c) => format!("Enter your maximum acceptable risk (volatility, 0 to {c:.2}): "),
        None => "Enter your maximum acceptable risk (annualized volatility): ".to_string(),
      },
      IntakeField::RiskFreeRate => {
        "Enter the annualized risk-free rate (decimal, e.g., 0.04): ".to_string()
      }
    })
  }

  /// Parse and check one answer for the pending field.
  pub fn submit(&mut self, input: &str) -> &IntakeState {
    let Some(field) = self.pending() else {
      return &self.state;
    };

    self.state = match self.accept(field, input) {
      Ok(Some(next)) => IntakeState::Prompting(next),
      Ok(None) => match self.assemble() {
        Ok(cfg) => IntakeState::Validated(Box::new(cfg)),
        Err(e) => IntakeState::Rejected {
          field,
          reason: e.to_string(),
        },
      },
      Err(e) => IntakeState::Rejected {
        field,
        reason: e.to_string(),
      },
    };
    &self.state
  }

  /// The validated configuration, or an error naming the pending field.
  pub fn finish(self) -> Result<PortfolioConfig> {
    match self.state {
      IntakeState::Validated(cfg) => Ok(*cfg),
      IntakeState::Prompting(field) | IntakeState::Rejected { field, .. } => Err(
        PortfolioError::invalid(format!("intake incomplete: {field} not provided")),
      ),
    }
  }

  fn accept(&mut self, field: IntakeField, input: &str) -> Result<Option<IntakeField>> {
    let value = parse_number(input)?;
    match field {
      IntakeField::PortfolioSize => {
        check_portfolio_size(value)?;
        self.answers.portfolio_size = Some(value);
      }
      IntakeField::ConfidenceLevel => {
        check_confidence_level(value)?;
        self.answers.confidence_level = Some(value);
      }
      IntakeField::MaxDrawdown => {
        let size = self
          .answers
          .portfolio_size
          .ok_or_else(|| PortfolioError::invalid("portfolio size not provided"))?;
        check_max_drawdown(value, size)?;
        self.answers.max_drawdown = Some(value);
      }
      IntakeField::MaxVolatility => {
        check_max_volatility(value, self.volatility_ceiling)?;
        self.answers.max_volatility = Some(value);
      }
      IntakeField::RiskFreeRate => {
        if !value.is_finite() {
          return Err(PortfolioError::invalid("risk-free rate must be finite"));
        }
        self.answers.risk_free_rate = Some(value);
      }
    }
    Ok(field.next())
  }

  fn assemble(&self) -> Result<PortfolioConfig> {
    let missing = |name: &str| PortfolioError::invalid(format!("{name} not provided"));
    let a = &self.answers;
    let portfolio_size = a.portfolio_size.ok_or_else(|| missing("portfolio size"))?;
    let confidence = a.confidence_level.ok_or_else(|| missing("confidence level"))?;
    let max_drawdown = a.max_drawdown.ok_or_else(|| missing("maximum drawdown"))?;
    let max_volatility = a.max_volatility.ok_or_else(|| missing("maximum volatility"))?;
    let risk_free_rate = a.risk_free_rate.ok_or_else(|| missing("risk-free rate"))?;

    let cfg = match &self.base {
      Some(base) => PortfolioConfig {
        risk_free_rate,
        confidence_level: confidence,
        portfolio_size_dollars: portfolio_size,
        max_drawdown_dollars: max_drawdown,
        max_volatility,
        ..base.clone()
      },
      None => PortfolioConfig::new(
        risk_free_rate,
        confidence,
        portfolio_size,
        max_drawdown,
        max_volatility,
      ),
    };
    cfg.validate()?;
    Ok(cfg)
  }
}

fn parse_number(input: &str) -> Result<f64> {
  input
    .trim()
    .parse::<f64>()
    .map_err(|_| PortfolioError::invalid("invalid input, please enter a numeric value"))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn run(intake: &mut ConfigIntake, answers: &[&str]) {
    for a in answers {
      intake.submit(a);
    }
  }

  #[test]
  fn walks_fields_in_order() {
    let mut intake = ConfigIntake::new();
    assert_eq!(intake.pending(), Some(IntakeField::PortfolioSize));
    intake.submit("100000");
    assert_eq!(intake.state(), &IntakeState::Prompting(IntakeField::ConfidenceLevel));
    run(&mut intake, &["0.95", "5000", "0.3", "0.04"]);

    let cfg = intake.finish().unwrap();
    assert_eq!(cfg.portfolio_size_dollars, 100_000.0);
    assert_eq!(cfg.confidence_level, 0.95);
    assert_eq!(cfg.max_drawdown_dollars, 5_000.0);
    assert_eq!(cfg.max_volatility, 0.3);
    assert_eq!(cfg.risk_free_rate, 0.04);
  }

  #[test]
  fn rejection_keeps_field_pending() {
    let mut intake = ConfigIntake::new();
    intake.submit("abc");
    assert!(matches!(
      intake.state(),
      IntakeState::Rejected {
        field: IntakeField::PortfolioSize,
        ..
      }
    ));
    intake.submit("-5");
    assert_eq!(intake.pending(), Some(IntakeField::PortfolioSize));

    intake.submit("1000");
    intake.submit("1.5");
    assert_eq!(intake.pending(), Some(IntakeField::ConfidenceLevel));
    intake.submit("0.9");

    // Drawdown must stay below the portfolio size.
    let state = intake.submit("1000").clone();
    match state {
      IntakeState::Rejected { field, reason } => {
        assert_eq!(field, IntakeField::MaxDrawdown);
        assert!(reason.contains("smaller than the portfolio size"));
      }
      other => panic!("unexpected state {other:?}"),
    }
  }

  #[test]
  fn volatility_ceiling_bounds_the_answer() {
    let mut intake = ConfigIntake::new().with_volatility_ceiling(1.0);
    run(&mut intake, &["1000", "0.95", "100", "1.2"]);
    assert_eq!(intake.pending(), Some(IntakeField::MaxVolatility));
    assert!(intake.prompt().unwrap().contains("0 to 1.00"));
    intake.submit("0.8");
    assert_eq!(intake.pending(), Some(IntakeField::RiskFreeRate));
  }

  #[test]
  fn base_settings_are_preserved() {
    let mut base = PortfolioConfig::new(0.0, 0.99, 1.0, 0.5, 1.0);
    base.sample_count = 123;
    base.seed = Some(9);
    let mut intake = ConfigIntake::new().with_base(base);
    run(&mut intake, &["5000", "0.95", "250", "0.2", "0.03"]);

    let cfg = intake.finish().unwrap();
    assert_eq!(cfg.sample_count, 123);
    assert_eq!(cfg.seed, Some(9));
    assert_eq!(cfg.confidence_level, 0.95);
  }

  #[test]
  fn unfinished_intake_is_an_error() {
    let mut intake = ConfigIntake::new();
    intake.submit("1000");
    let err = intake.finish().unwrap_err();
    assert!(err.to_string().contains("confidence level"));
  }
}
