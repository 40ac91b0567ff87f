//! # Asset Statistics
//!
//! $$
//! \hat\mu_i=\frac1T\sum_{t=1}^T r_{t,i},\qquad
//! \hat\Sigma_{ij}=\frac1{T-1}\sum_{t=1}^T (r_{t,i}-\hat\mu_i)(r_{t,j}-\hat\mu_j)
//! $$
//!
//! Mean-return vector and sample covariance at native periodicity. Annualization
//! is applied by callers through a periods-per-year factor.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use super::data::ReturnMatrix;
use crate::error::PortfolioError;
use crate::error::Result;

/// First and second moments of the asset return distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetStatistics {
  mean_returns: Array1<f64>,
  covariance: Array2<f64>,
}

impl AssetStatistics {
  /// Estimate sample mean and covariance (`ddof = 1`) from a return matrix.
  pub fn estimate(matrix: &ReturnMatrix) -> Result<Self> {
    let returns = matrix.returns();
    if returns.nrows() < 2 {
      return Err(PortfolioError::InsufficientObservations {
        required: 2,
        available: returns.nrows(),
      });
    }

    let mean_returns = returns
      .mean_axis(Axis(0))
      .ok_or_else(|| PortfolioError::invalid("return matrix is empty"))?;
    let covariance = returns
      .t()
      .cov(1.0)
      .map_err(|e| PortfolioError::invalid(format!("covariance: {e}")))?;

    Ok(Self {
      mean_returns,
      covariance,
    })
  }

  /// Build statistics from externally supplied moments.
  pub fn from_parts(mean_returns: Array1<f64>, covariance: Array2<f64>) -> Result<Self> {
    let n = mean_returns.len();
    if n == 0 {
      return Err(PortfolioError::invalid("at least one asset is required"));
    }
    if covariance.dim() != (n, n) {
      return Err(PortfolioError::invalid(format!(
        "covariance must be {n}x{n}, got {:?}",
        covariance.dim()
      )));
    }
    if mean_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::invalid("moments must be finite"));
    }
    for i in 0..n {
      if covariance[[i, i]] < 0.0 {
        return Err(PortfolioError::invalid(format!("negative variance for asset {i}")));
      }
      for j in (i + 1)..n {
        let scale = covariance[[i, j]].abs().max(covariance[[j, i]].abs()).max(1.0);
        if (covariance[[i, j]] - covariance[[j, i]]).abs() > 1e-12 * scale {
          return Err(PortfolioError::invalid("covariance must be symmetric"));
        }
      }
    }

    Ok(Self {
      mean_returns,
      covariance,
    })
  }

  /// Number of assets.
  pub fn n_assets(&self) -> usize {
    self.mean_returns.len()
  }

  /// Per-period mean return of each asset.
  pub fn mean_returns(&self) -> &Array1<f64> {
    &self.mean_returns
  }

  /// Per-period sample covariance.
  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  /// Per-period volatility of each asset.
  pub fn volatilities(&self) -> Array1<f64> {
    self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// Per-period expected return `μᵀw`.
  ///
  /// # Panics
  /// Panics if `weights.len()` differs from the asset count.
  pub fn portfolio_mean(&self, weights: &[f64]) -> f64 {
    self.mean_returns.dot(&ArrayView1::from(weights))
  }

  /// Per-period variance `wᵀΣw`, floored at zero.
  ///
  /// # Panics
  /// Panics if `weights.len()` differs from the asset count.
  pub fn portfolio_variance(&self, weights: &[f64]) -> f64 {
    let w = ArrayView1::from(weights);
    w.dot(&self.covariance.dot(&w)).max(0.0)
  }

  /// `μᵀw × periods_per_year`.
  pub fn annualized_return(&self, weights: &[f64], periods_per_year: f64) -> f64 {
    self.portfolio_mean(weights) * periods_per_year
  }

  /// `√(wᵀΣw) × √periods_per_year`.
  pub fn annualized_volatility(&self, weights: &[f64], periods_per_year: f64) -> f64 {
    self.portfolio_variance(weights).sqrt() * periods_per_year.sqrt()
  }

  /// Pearson correlation implied by the covariance; zero-variance assets get zero
  /// off-diagonal correlation.
  pub fn correlation(&self) -> Array2<f64> {
    let n = self.n_assets();
    let sigma = self.volatilities();
    Array2::from_shape_fn((n, n), |(i, j)| {
      if i == j {
        return 1.0;
      }
      let denom = sigma[i] * sigma[j];
      if denom > 1e-15 {
        (self.covariance[[i, j]] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      }
    })
  }
}
