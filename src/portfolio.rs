//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Monte Carlo efficient frontier, tail-risk filtering and minimum-volatility
//! optimization for long-only portfolios.

pub mod data;
pub mod engine;
pub mod metrics;
pub mod optimizers;
pub mod risk;
pub mod sampler;
pub mod selector;
pub mod stats;
pub mod table;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use data::Resolution;
pub use data::ReturnMatrix;
pub use data::resample_sum;
pub use data::simple_returns_series;
pub use engine::PortfolioEngine;
pub use engine::PortfolioRun;
pub use metrics::AssetMetrics;
pub use metrics::RealizedMetrics;
pub use metrics::asset_metrics;
pub use metrics::cumulative_growth;
pub use metrics::realized_portfolio_metrics;
pub use optimizers::OptimizedPortfolio;
pub use optimizers::OptimizerConfig;
pub use optimizers::optimize_min_volatility;
pub use risk::RiskMetricEngine;
pub use risk::TailRisk;
pub use risk::expected_shortfall;
pub use risk::parametric_var_es;
pub use risk::portfolio_return_series;
pub use risk::portfolio_returns;
pub use risk::scale_to_holding_period;
pub use risk::value_at_risk;
pub use sampler::MonteCarloSampler;
pub use sampler::WeightScheme;
pub use selector::FeasibleSet;
pub use selector::Objective;
pub use selector::RiskConstraint;
pub use selector::efficient_frontier;
pub use selector::feasible_set;
pub use selector::select;
pub use stats::AssetStatistics;
pub use table::SampleTable;
pub use types::PortfolioSample;
pub use types::SampleOrigin;
pub use types::SampleSet;
pub use types::WeightVector;
