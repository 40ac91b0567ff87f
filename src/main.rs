use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::bail;
use chrono::NaiveDate;
use clap::Parser;
use frontier_rs::PERIODS_PER_YEAR;
use frontier_rs::PortfolioError;
use frontier_rs::config::PortfolioConfig;
use frontier_rs::config::intake::ConfigIntake;
use frontier_rs::config::intake::IntakeState;
use frontier_rs::portfolio::AssetStatistics;
use frontier_rs::portfolio::MonteCarloSampler;
use frontier_rs::portfolio::Objective;
use frontier_rs::portfolio::PortfolioEngine;
use frontier_rs::portfolio::ReturnMatrix;
use frontier_rs::portfolio::SampleTable;
use frontier_rs::portfolio::WeightScheme;
use frontier_rs::portfolio::WeightVector;
use frontier_rs::portfolio::asset_metrics;
use frontier_rs::portfolio::efficient_frontier;
use frontier_rs::portfolio::realized_portfolio_metrics;
use frontier_rs::portfolio::table::render_asset_metrics;
use frontier_rs::portfolio::table::render_sample;
use ndarray::Array2;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const PREVIEW_SAMPLES: usize = 2_000;

#[derive(Parser)]
#[command(name = "frontier")]
#[command(about = "Monte Carlo efficient frontier with VaR/ES limits and minimum-volatility optimization")]
struct Cli {
  /// Price table: header `Date,<ASSET>,...`, one row per date, adjusted closes
  #[arg(short, long)]
  prices: PathBuf,

  /// TOML configuration file (FRONTIER_* environment variables override it)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Ask for portfolio size, confidence, limits and risk-free rate on stdin
  #[arg(short, long)]
  interactive: bool,

  /// Number of sample rows to print
  #[arg(short, long, default_value = "10")]
  top: usize,

  /// Volatility buckets used for the efficient frontier
  #[arg(long, default_value = "25")]
  frontier_buckets: usize,
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();

  let matrix = load_return_matrix(&cli.prices)
    .with_context(|| format!("reading {}", cli.prices.display()))?;

  let config = if cli.interactive {
    let base = cli
      .config
      .as_deref()
      .map(|p| PortfolioConfig::load(Some(p)))
      .transpose()?;
    prompt_config(&matrix, base)?
  } else {
    PortfolioConfig::load(cli.config.as_deref())?
  };

  let engine = PortfolioEngine::new(config)?;
  let cfg = engine.config();

  let stats = engine.statistics(&matrix)?;
  let metrics = asset_metrics(matrix.assets(), &stats, cfg.risk_free_rate, cfg.periods_per_year)?;
  println!("\nAsset metrics\n{}", render_asset_metrics(&metrics));

  let equal = WeightVector::equal(matrix.n_assets())?;
  let realized = realized_portfolio_metrics(&matrix, &equal, cfg.risk_free_rate, cfg.periods_per_year)?;
  println!(
    "Equal-weight portfolio: return {:.4}, volatility {:.4}, growth of $1 {:.4}",
    realized.annualized_return,
    realized.annualized_volatility,
    realized.cumulative_growth.last().copied().unwrap_or(1.0)
  );

  let raw = engine.sample(&stats, matrix.assets())?;
  let samples = engine.augment(&raw, &matrix)?;
  let table = SampleTable::from_samples(samples.assets(), &samples);
  println!("\nSimulated portfolios (first {})\n{}", cli.top, table.render(cli.top));

  let frontier = efficient_frontier(&samples, cli.frontier_buckets);
  println!("Efficient frontier: {} of {} samples", frontier.len(), samples.len());

  match engine.select_unconstrained(&samples, Objective::MaxSharpe) {
    Ok(best) => println!(
      "\nMaximum Sharpe ratio ({})\n{}",
      best.origin,
      render_sample(samples.assets(), best)
    ),
    Err(e) => println!("\nMaximum Sharpe ratio: {e}"),
  }
  let calm = engine.select_unconstrained(&samples, Objective::MinVolatility)?;
  println!(
    "\nMinimum volatility sample ({})\n{}",
    calm.origin,
    render_sample(samples.assets(), calm)
  );

  match engine.select(&samples) {
    Ok(chosen) => println!(
      "\nHighest return under {} ({})\n{}",
      engine.constraint(),
      chosen.origin,
      render_sample(samples.assets(), chosen)
    ),
    Err(PortfolioError::Infeasible { constraint }) => {
      println!("\nNo feasible portfolio under {constraint}. Consider relaxing the limit.")
    }
    Err(e) => return Err(e.into()),
  }

  match engine.optimize(&stats) {
    Ok(opt) => {
      let sample = engine.risk_engine().attach(&matrix, &opt.sample)?;
      println!(
        "\nOptimized minimum volatility ({} iterations)\n{}",
        opt.iterations,
        render_sample(samples.assets(), &sample)
      );
    }
    Err(e @ PortfolioError::Convergence { .. }) => println!("\nOptimizer: {e}"),
    Err(e) => return Err(e.into()),
  }

  Ok(())
}

/// Drive the intake from stdin, bounding the volatility answer by a preview draw.
fn prompt_config(
  matrix: &ReturnMatrix,
  base: Option<PortfolioConfig>,
) -> anyhow::Result<PortfolioConfig> {
  let stats = AssetStatistics::estimate(matrix)?;
  let (periods_per_year, seed) = base
    .as_ref()
    .map_or((PERIODS_PER_YEAR, None), |b| (b.periods_per_year, b.seed));
  // Volatility does not depend on the risk-free rate, so any rate will do here.
  let preview = MonteCarloSampler::new(
    PREVIEW_SAMPLES,
    0.0,
    periods_per_year,
    WeightScheme::default(),
    seed,
  )
  .sample(&stats, matrix.assets())?;

  let mut intake = ConfigIntake::new().with_volatility_ceiling(preview.volatility_ceiling());
  if let Some(base) = base {
    intake = intake.with_base(base);
  }

  let stdin = std::io::stdin();
  let mut lines = stdin.lock().lines();
  while let Some(prompt) = intake.prompt() {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let Some(line) = lines.next() else {
      bail!("input ended before the configuration was complete");
    };
    if let IntakeState::Rejected { reason, .. } = intake.submit(&line?) {
      println!("{reason}");
    }
  }

  Ok(intake.finish()?)
}

/// Price table as read from disk, before return conversion.
struct PriceTable {
  assets: Vec<String>,
  dates: Vec<NaiveDate>,
  prices: Array2<f64>,
  unparsable_cells: usize,
}

/// Split one CSV record on commas outside double quotes. `""` inside a quoted
/// field is a literal quote.
fn split_record(line: &str) -> Vec<String> {
  let mut fields = Vec::new();
  let mut field = String::new();
  let mut quoted = false;
  let mut chars = line.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '"' if quoted && chars.peek() == Some(&'"') => {
        field.push('"');
        chars.next();
      }
      '"' => quoted = !quoted,
      ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
      _ => field.push(c),
    }
  }
  fields.push(field.trim().to_string());
  fields
}

/// Read a comma separated price table with a `Date` column first.
///
/// Empty or unparsable cells become NaN and are counted; the return conversion
/// drops their rows.
fn read_price_table(path: &Path) -> anyhow::Result<PriceTable> {
  let file = File::open(path)?;
  let reader = BufReader::new(file);
  let mut lines = reader.lines();

  let header = match lines.next() {
    Some(line) => line?,
    None => bail!("price table is empty"),
  };
  let assets: Vec<String> = split_record(header.trim_start_matches('\u{feff}'))
    .into_iter()
    .skip(1)
    .collect();

  let mut dates = Vec::new();
  let mut flat = Vec::new();
  let mut unparsable_cells = 0;
  for (i, line) in lines.enumerate() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let mut cells = split_record(&line).into_iter();
    let date_cell = cells.next().unwrap_or_default();
    let date = NaiveDate::parse_from_str(&date_cell, "%Y-%m-%d")
      .with_context(|| format!("line {}: bad date {date_cell:?}", i + 2))?;

    let row: Vec<f64> = cells
      .map(|c| {
        c.parse::<f64>().unwrap_or_else(|_| {
          unparsable_cells += 1;
          f64::NAN
        })
      })
      .collect();
    if row.len() != assets.len() {
      bail!("line {}: expected {} prices, found {}", i + 2, assets.len(), row.len());
    }
    dates.push(date);
    flat.extend(row);
  }

  let prices = Array2::from_shape_vec((dates.len(), assets.len()), flat)?;
  Ok(PriceTable {
    assets,
    dates,
    prices,
    unparsable_cells,
  })
}

/// Read prices and convert them to returns, reporting rows lost to gaps.
fn load_return_matrix(path: &Path) -> anyhow::Result<ReturnMatrix> {
  let table = read_price_table(path)?;
  let price_rows = table.dates.len();
  let matrix = ReturnMatrix::from_prices(table.assets, table.dates, table.prices)?;
  // the first price row never yields a return
  let dropped_rows = price_rows.saturating_sub(1 + matrix.n_periods());
  tracing::info!(
    assets = matrix.n_assets(),
    periods = matrix.n_periods(),
    price_rows,
    dropped_rows,
    unparsable_cells = table.unparsable_cells,
    "loaded return matrix"
  );
  if dropped_rows > 0 {
    tracing::warn!(dropped_rows, "rows with missing or unparsable prices were dropped");
  }
  Ok(matrix)
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tracing_test::traced_test;

  use super::*;

  #[test]
  fn quoted_fields_keep_their_commas() {
    assert_eq!(
      split_record(r#"Date,"BRK, B",SPY,"say ""hi""""#),
      vec!["Date", "BRK, B", "SPY", r#"say "hi""#]
    );
    assert_eq!(split_record("a,,b"), vec!["a", "", "b"]);
  }

  #[test]
  #[traced_test]
  fn unparsable_prices_are_counted_and_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      "Date,\"Acme, Inc\",B\n\
       2024-01-01,100,50\n\
       2024-01-02,101,51\n\
       2024-01-03,n/a,52\n\
       2024-01-04,103,53\n\
       2024-01-05,104,54\n\
       2024-01-08,105,55\n\
       2024-01-09,106,56\n"
    )
    .unwrap();

    let table = read_price_table(file.path()).unwrap();
    assert_eq!(table.assets, vec!["Acme, Inc", "B"]);
    assert_eq!(table.unparsable_cells, 1);

    // the gap removes the return into and out of 2024-01-03
    let matrix = load_return_matrix(file.path()).unwrap();
    assert_eq!(matrix.n_periods(), 4);
    assert!(logs_contain("dropped_rows=2"));
    assert!(logs_contain("unparsable_cells=1"));
  }
}
