//! # Sample Tables
//!
//! Row-per-sample tabular view of a sample set: one weight column per asset,
//! then return, volatility, Sharpe ratio and tail-risk columns. Undefined
//! values are written as NaN.

use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;
use prettytable::format;
use serde::Serialize;

use super::metrics::AssetMetrics;
use super::types::PortfolioSample;

const METRIC_COLUMNS: [&str; 6] = [
  "Return",
  "Volatility",
  "Sharpe Ratio",
  "VaR",
  "ES",
  "ES_dollars",
];

/// Headers plus numeric rows, ready for export or rendering.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleTable {
  pub headers: Vec<String>,
  pub rows: Vec<Vec<f64>>,
}

impl SampleTable {
  /// Build a table from samples over `assets`, in iteration order.
  pub fn from_samples<'a, I>(assets: &[String], samples: I) -> Self
  where
    I: IntoIterator<Item = &'a PortfolioSample>,
  {
    let headers = assets
      .iter()
      .map(|a| format!("{a} Weight"))
      .chain(METRIC_COLUMNS.iter().map(|c| c.to_string()))
      .collect();

    let rows = samples
      .into_iter()
      .map(|s| {
        let mut row = s.weights.to_vec();
        row.extend([
          s.annualized_return,
          s.annualized_volatility,
          s.sharpe_ratio.unwrap_or(f64::NAN),
          s.value_at_risk.unwrap_or(f64::NAN),
          s.expected_shortfall.unwrap_or(f64::NAN),
          s.expected_shortfall_dollars.unwrap_or(f64::NAN),
        ]);
        row
      })
      .collect();

    Self { headers, rows }
  }

  /// Values of the column named `name`, if present.
  pub fn column(&self, name: &str) -> Option<Vec<f64>> {
    let idx = self.headers.iter().position(|h| h == name)?;
    Some(self.rows.iter().map(|r| r[idx]).collect())
  }

  /// Render the first `max_rows` rows.
  pub fn render(&self, max_rows: usize) -> String {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(Row::new(self.headers.iter().map(|h| Cell::new(h)).collect()));
    for row in self.rows.iter().take(max_rows) {
      table.add_row(Row::new(
        row.iter().map(|v| Cell::new(&format!("{v:.4}"))).collect(),
      ));
    }
    table.to_string()
  }
}

/// Render a single sample as an `asset | weight` table followed by its metrics.
pub fn render_sample(assets: &[String], sample: &PortfolioSample) -> String {
  let mut table = Table::new();
  table.set_format(*format::consts::FORMAT_CLEAN);
  for (asset, w) in assets.iter().zip(sample.weights.iter()) {
    table.add_row(Row::new(vec![
      Cell::new(asset),
      Cell::new(&format!("{:.2}%", w * 100.0)),
    ]));
  }

  let fmt_opt = |v: Option<f64>, digits: usize| {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.digits$}"))
  };
  let metrics = [
    ("Return", format!("{:.4}", sample.annualized_return)),
    ("Volatility", format!("{:.4}", sample.annualized_volatility)),
    ("Sharpe Ratio", fmt_opt(sample.sharpe_ratio, 4)),
    ("VaR", fmt_opt(sample.value_at_risk, 4)),
    ("ES", fmt_opt(sample.expected_shortfall, 4)),
    ("ES_dollars", fmt_opt(sample.expected_shortfall_dollars, 2)),
  ];
  for (name, value) in metrics {
    table.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
  }
  table.to_string()
}

/// Render per-asset metrics.
pub fn render_asset_metrics(metrics: &[AssetMetrics]) -> String {
  let mut table = Table::new();
  table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
  table.set_titles(Row::new(
    ["Asset", "Mean", "Ann. Return", "Volatility", "Ann. Volatility", "Sharpe Ratio"]
      .iter()
      .map(|h| Cell::new(h))
      .collect(),
  ));
  for m in metrics {
    table.add_row(Row::new(vec![
      Cell::new(&m.asset),
      Cell::new(&format!("{:.6}", m.mean_return)),
      Cell::new(&format!("{:.4}", m.annualized_return)),
      Cell::new(&format!("{:.6}", m.volatility)),
      Cell::new(&format!("{:.4}", m.annualized_volatility)),
      Cell::new(
        &m.sharpe_ratio
          .map_or_else(|| "n/a".to_string(), |s| format!("{s:.4}")),
      ),
    ]));
  }
  table.to_string()
}
