//! # frontier-rs
//!
//! $$
//! \max_{\mathbf w\in\Delta^{N-1}}\ \mu^\top\mathbf w
//! \quad\text{s.t.}\quad \mathrm{ES}_c(\mathbf w)\cdot V\ \ge\ -D_{\max}
//! $$
//!
//! Monte Carlo exploration of the long-only efficient frontier with historical
//! Value-at-Risk / Expected Shortfall filtering and an analytical
//! minimum-volatility solution.
//!
//! The pipeline is built from explicit stages:
//!
//! - [`portfolio::AssetStatistics`] estimates mean returns and covariance from a
//!   [`portfolio::ReturnMatrix`].
//! - [`portfolio::MonteCarloSampler`] draws and evaluates random allocations.
//! - [`portfolio::RiskMetricEngine`] attaches VaR/ES to each sample.
//! - [`portfolio::feasible_set`] and [`portfolio::select`] apply investor limits.
//! - [`portfolio::optimize_min_volatility`] solves for the minimum-volatility weights.
//!
//! [`portfolio::PortfolioEngine`] wires the stages together from a
//! [`config::PortfolioConfig`].

pub mod config;
pub mod error;
pub mod portfolio;

pub use error::PortfolioError;
pub use error::Result;

/// Trading days per year used to annualize daily statistics.
pub const PERIODS_PER_YEAR: f64 = 252.0;
