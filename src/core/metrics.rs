use super::error::{Result, SimError};
use super::series::PriceSeries;
use super::types::{LedgerSnapshot, RunSummary};

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10_f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Final asset value per unit contributed, rounded to two decimals.
pub fn return_ratio(final_asset_value: f64, total_contributed: f64) -> Result<f64> {
    if total_contributed == 0.0 {
        return Err(SimError::division_by_zero("return ratio"));
    }
    Ok(round_to(final_asset_value / total_contributed, 2))
}

/// Annualised growth of the asset-value-to-contribution ratio in percent:
/// `100 * ((asset / contributed)^(1 / years) - 1)`.
///
/// This is not a market CAGR; it annualises how far the pot ended above what was
/// paid in, over the calendar years the series spans.
pub fn cagr_percent(final_asset_value: f64, total_contributed: f64, years: usize) -> Result<f64> {
    if total_contributed == 0.0 {
        return Err(SimError::division_by_zero("CAGR contribution ratio"));
    }
    if years == 0 {
        return Err(SimError::division_by_zero("CAGR year count"));
    }
    let ratio = final_asset_value / total_contributed;
    Ok(100.0 * (ratio.powf(1.0 / years as f64) - 1.0))
}

pub fn summarize(snapshots: &[LedgerSnapshot], series: &PriceSeries) -> Result<RunSummary> {
    let Some(last) = snapshots.last() else {
        return Err(SimError::division_by_zero("summary of an empty ledger"));
    };
    let years_spanned = series.distinct_years();

    Ok(RunSummary {
        final_asset_value: last.asset_value,
        total_contributed: last.total_contributed,
        shares_owned: last.shares_owned,
        return_ratio: return_ratio(last.asset_value, last.total_contributed)?,
        cagr_percent: cagr_percent(last.asset_value, last.total_contributed, years_spanned)?,
        years_spanned,
    })
}
