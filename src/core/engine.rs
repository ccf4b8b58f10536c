use tracing::debug;

use super::error::Result;
use super::ledger::PortfolioLedger;
use super::metrics::summarize;
use super::policy::ContributionPolicy;
use super::series::PriceSeries;
use super::types::{LedgerSnapshot, SimulationRun, StrategyConfig};

pub fn run_strategy(series: &PriceSeries, config: &StrategyConfig) -> Result<SimulationRun> {
    let snapshots = simulate_ledger(series, config)?;
    let summary = summarize(&snapshots, series)?;
    debug!(
        label = %config.label,
        periods = snapshots.len(),
        final_asset_value = summary.final_asset_value,
        return_ratio = summary.return_ratio,
        "strategy run complete"
    );

    Ok(SimulationRun {
        label: config.label.clone(),
        summary,
        snapshots,
    })
}

/// Folds the series through a fresh ledger without computing metrics.
///
/// The policy is validated before the first period, so a bad configuration never
/// produces a partial ledger.
pub fn simulate_ledger(series: &PriceSeries, config: &StrategyConfig) -> Result<Vec<LedgerSnapshot>> {
    let mut policy = ContributionPolicy::new(config, series)?;
    let mut ledger = PortfolioLedger::with_capacity(series.len());
    debug!(label = %config.label, periods = series.len(), "starting strategy run");

    for observation in series {
        let contribution = policy.contribution_for(observation);
        ledger.advance_period(observation, contribution);
    }

    Ok(ledger.into_snapshots())
}

/// Runs every configuration against the same series in input order.
pub fn compare_strategies(series: &PriceSeries, configs: &[StrategyConfig]) -> Result<Vec<SimulationRun>> {
    configs
        .iter()
        .map(|config| run_strategy(series, config))
        .collect()
}
