//! # Errors
//!
//! Failure taxonomy shared by every pipeline stage.

use thiserror::Error;

/// Result type alias for portfolio operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;

/// Errors raised by the statistics, sampling, risk, selection and optimization stages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
  /// Malformed or insufficient return data, or an out-of-range parameter.
  #[error("invalid input: {reason}")]
  InputValidation { reason: String },

  /// Return sequence too short for the requested tail probability.
  #[error("insufficient observations: need at least {required}, got {available}")]
  InsufficientObservations { required: usize, available: usize },

  /// Zero-volatility allocation whose Sharpe ratio is undefined.
  #[error("degenerate {sample}: volatility is zero, Sharpe ratio undefined")]
  DegenerateSample { sample: String },

  /// No sample or optimizer result satisfies the constraint.
  #[error("no feasible portfolio under {constraint}")]
  Infeasible { constraint: String },

  /// The optimizer did not reach a valid solution.
  #[error("optimizer failed after {iterations} iterations: {reason}")]
  Convergence { reason: String, iterations: u64 },
}

impl PortfolioError {
  /// Create an input validation error.
  pub fn invalid(reason: impl Into<String>) -> Self {
    Self::InputValidation {
      reason: reason.into(),
    }
  }

  /// Create an infeasible-set error.
  pub fn infeasible(constraint: impl Into<String>) -> Self {
    Self::Infeasible {
      constraint: constraint.into(),
    }
  }

  /// Create a convergence error.
  pub fn convergence(reason: impl Into<String>, iterations: u64) -> Self {
    Self::Convergence {
      reason: reason.into(),
      iterations,
    }
  }

  /// Whether the error belongs to the input-validation class.
  pub fn is_input_validation(&self) -> bool {
    matches!(
      self,
      Self::InputValidation { .. } | Self::InsufficientObservations { .. }
    )
  }
}
