//! # Return Data
//!
//! $$
//! r_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1
//! $$
//!
//! Date-indexed return matrix, price conversion and calendar resampling.

use std::collections::HashSet;

use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;

/// Calendar resolution of a return sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
  /// One observation per row of the matrix (trading day).
  Native,
  /// Sum of native returns within each ISO week.
  Weekly,
  /// Sum of native returns within each calendar month.
  #[default]
  Monthly,
}

impl Resolution {
  fn bucket(&self, row: usize, date: NaiveDate) -> (i64, u32) {
    match self {
      Self::Native => (row as i64, 0),
      Self::Weekly => {
        let week = date.iso_week();
        (i64::from(week.year()), week.week())
      }
      Self::Monthly => (i64::from(date.year()), date.month()),
    }
  }
}

/// Aligned per-asset period returns, one row per date and one column per asset.
///
/// Rows are strictly increasing in date and every cell is finite. The matrix is
/// never mutated after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnMatrix {
  assets: Vec<String>,
  dates: Vec<NaiveDate>,
  returns: Array2<f64>,
}

impl ReturnMatrix {
  /// Build a matrix from already-computed period returns.
  pub fn new(assets: Vec<String>, dates: Vec<NaiveDate>, returns: Array2<f64>) -> Result<Self> {
    validate_labels(&assets, &dates, returns.nrows(), returns.ncols())?;

    if returns.nrows() < 2 {
      return Err(PortfolioError::InsufficientObservations {
        required: 2,
        available: returns.nrows(),
      });
    }

    for (i, column) in returns.axis_iter(Axis(1)).enumerate() {
      if column.iter().all(|v| !v.is_finite()) {
        return Err(PortfolioError::invalid(format!(
          "asset {} has no finite returns",
          assets[i]
        )));
      }
      if let Some(t) = column.iter().position(|v| !v.is_finite()) {
        return Err(PortfolioError::invalid(format!(
          "asset {} has a missing return on {}",
          assets[i], dates[t]
        )));
      }
    }

    Ok(Self {
      assets,
      dates,
      returns,
    })
  }

  /// Convert a price table into simple returns.
  ///
  /// The first row is consumed by the differencing, and any later row holding a
  /// non-finite return in some column is dropped.
  pub fn from_prices(
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    prices: Array2<f64>,
  ) -> Result<Self> {
    validate_labels(&assets, &dates, prices.nrows(), prices.ncols())?;

    let n = assets.len();
    let columns: Vec<Vec<f64>> = prices
      .axis_iter(Axis(1))
      .map(|col| simple_returns_series(&col.to_vec()))
      .collect();

    for (i, col) in columns.iter().enumerate() {
      if col.iter().all(|v| !v.is_finite()) {
        return Err(PortfolioError::invalid(format!(
          "asset {} has no finite returns",
          assets[i]
        )));
      }
    }

    let periods = prices.nrows().saturating_sub(1);
    let mut kept_dates = Vec::with_capacity(periods);
    let mut flat = Vec::with_capacity(periods * n);
    for t in 0..periods {
      if columns.iter().all(|col| col[t].is_finite()) {
        kept_dates.push(dates[t + 1]);
        flat.extend(columns.iter().map(|col| col[t]));
      }
    }

    let returns = Array2::from_shape_vec((kept_dates.len(), n), flat)
      .map_err(|e| PortfolioError::invalid(format!("return matrix shape: {e}")))?;

    Self::new(assets, kept_dates, returns)
  }

  /// Asset identifiers in column order.
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Date index in row order.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Borrow the raw return matrix.
  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  /// Return series of a single asset.
  pub fn asset_returns(&self, asset: usize) -> ArrayView1<'_, f64> {
    self.returns.column(asset)
  }

  /// Number of assets (columns).
  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  /// Number of periods (rows).
  pub fn n_periods(&self) -> usize {
    self.dates.len()
  }
}

fn validate_labels(
  assets: &[String],
  dates: &[NaiveDate],
  rows: usize,
  cols: usize,
) -> Result<()> {
  if assets.is_empty() {
    return Err(PortfolioError::invalid("at least one asset is required"));
  }
  if cols != assets.len() {
    return Err(PortfolioError::invalid(format!(
      "{} asset labels for {} columns",
      assets.len(),
      cols
    )));
  }
  if rows != dates.len() {
    return Err(PortfolioError::invalid(format!(
      "{} dates for {} rows",
      dates.len(),
      rows
    )));
  }

  let mut seen = HashSet::with_capacity(assets.len());
  for asset in assets {
    if asset.trim().is_empty() {
      return Err(PortfolioError::invalid("empty asset identifier"));
    }
    if !seen.insert(asset.as_str()) {
      return Err(PortfolioError::invalid(format!(
        "duplicate asset identifier {asset}"
      )));
    }
  }

  if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
    return Err(PortfolioError::invalid(format!(
      "dates must be strictly increasing ({} then {})",
      w[0], w[1]
    )));
  }

  Ok(())
}

/// Convert close prices to simple period-over-period returns.
///
/// Output has one element fewer than the input. A non-positive or non-finite
/// previous price yields a non-finite return at that position.
pub fn simple_returns_series(closes: &[f64]) -> Vec<f64> {
  closes
    .windows(2)
    .map(|w| {
      if w[0] > 0.0 && w[0].is_finite() && w[1].is_finite() {
        w[1] / w[0] - 1.0
      } else {
        f64::NAN
      }
    })
    .collect()
}

/// Sum native returns within each calendar period of `resolution`.
///
/// Only periods that contain at least one observation are emitted, in date order.
pub fn resample_sum(dates: &[NaiveDate], values: &[f64], resolution: Resolution) -> Vec<f64> {
  if resolution == Resolution::Native {
    return values.to_vec();
  }

  let mut out: Vec<f64> = Vec::new();
  let mut current = None;
  for (row, (&date, &value)) in dates.iter().zip(values.iter()).enumerate() {
    let key = resolution.bucket(row, date);
    if current == Some(key) {
      if let Some(acc) = out.last_mut() {
        *acc += value;
      }
    } else {
      out.push(value);
      current = Some(key);
    }
  }
  out
}
