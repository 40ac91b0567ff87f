//! # Realized Metrics
//!
//! $$
//! G_t=\prod_{s\le t}(1+R_{p,s}),\qquad
//! \hat\sigma_p^{\text{ann}}=\operatorname{sd}(R_p)\sqrt{P}
//! $$
//!
//! Per-asset summaries and realized figures for a fixed allocation.

use serde::Serialize;

use super::data::ReturnMatrix;
use super::risk::portfolio_returns;
use super::stats::AssetStatistics;
use super::types::MIN_VOLATILITY;
use crate::error::PortfolioError;
use crate::error::Result;

/// Return and risk summary of a single asset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssetMetrics {
  pub asset: String,
  pub mean_return: f64,
  pub annualized_return: f64,
  pub volatility: f64,
  pub annualized_volatility: f64,
  /// `None` for a zero-variance asset.
  pub sharpe_ratio: Option<f64>,
}

/// Per-asset metrics from the estimated moments.
pub fn asset_metrics(
  assets: &[String],
  stats: &AssetStatistics,
  risk_free_rate: f64,
  periods_per_year: f64,
) -> Result<Vec<AssetMetrics>> {
  if assets.len() != stats.n_assets() {
    return Err(PortfolioError::invalid(format!(
      "{} asset labels for {} assets",
      assets.len(),
      stats.n_assets()
    )));
  }
  let vols = stats.volatilities();

  Ok(
    assets
      .iter()
      .zip(stats.mean_returns().iter().zip(vols.iter()))
      .map(|(asset, (&mean, &vol))| {
        let annualized_return = mean * periods_per_year;
        let annualized_volatility = vol * periods_per_year.sqrt();
        AssetMetrics {
          asset: asset.clone(),
          mean_return: mean,
          annualized_return,
          volatility: vol,
          annualized_volatility,
          sharpe_ratio: (annualized_volatility > MIN_VOLATILITY)
            .then(|| (annualized_return - risk_free_rate) / annualized_volatility),
        }
      })
      .collect(),
  )
}

/// Figures measured on the realized return series of one allocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RealizedMetrics {
  pub annualized_return: f64,
  pub annualized_volatility: f64,
  pub sharpe_ratio: Option<f64>,
  /// Growth of one unit invested at the first period, one entry per period.
  pub cumulative_growth: Vec<f64>,
}

/// Realized annualized return, volatility (`ddof = 1`) and growth for `weights`.
pub fn realized_portfolio_metrics(
  matrix: &ReturnMatrix,
  weights: &[f64],
  risk_free_rate: f64,
  periods_per_year: f64,
) -> Result<RealizedMetrics> {
  let series = portfolio_returns(matrix, weights)?;
  let n = series.len() as f64;
  let mean = series.iter().sum::<f64>() / n;
  let var = series.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);

  let annualized_return = mean * periods_per_year;
  let annualized_volatility = var.max(0.0).sqrt() * periods_per_year.sqrt();
  Ok(RealizedMetrics {
    annualized_return,
    annualized_volatility,
    sharpe_ratio: (annualized_volatility > MIN_VOLATILITY)
      .then(|| (annualized_return - risk_free_rate) / annualized_volatility),
    cumulative_growth: cumulative_growth(&series),
  })
}

/// Running product `Π (1 + r_t)`.
pub fn cumulative_growth(returns: &[f64]) -> Vec<f64> {
  returns
    .iter()
    .scan(1.0, |acc, r| {
      *acc *= 1.0 + r;
      Some(*acc)
    })
    .collect()
}
