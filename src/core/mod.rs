mod engine;
mod error;
mod ledger;
mod metrics;
mod policy;
mod series;
mod types;

pub use engine::{compare_strategies, run_strategy, simulate_ledger};
pub use error::{Result, SimError};
pub use ledger::PortfolioLedger;
pub use metrics::{cagr_percent, return_ratio, round_to, summarize};
pub use policy::{ContributionPolicy, MAX_BOOST_FRACTION, boost_multiplier};
pub use series::PriceSeries;
pub use types::{
    LedgerSnapshot, PortfolioState, PriceObservation, RunSummary, SimulationRun, StepAnchor,
    StepRule, StrategyConfig, VolatilityBoost, YearlyStepUp,
};
