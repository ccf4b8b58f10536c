use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    pub period_index: usize,
    pub date: NaiveDate,
    pub price: f64,
    /// Change against the previous observation in percent; 0 for the first one.
    pub percentage_change: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PortfolioState {
    pub shares_owned: u64,
    pub available_cash: f64,
    pub total_contributed: f64,
}

impl PortfolioState {
    pub fn asset_value(&self, price: f64) -> f64 {
        self.available_cash + price * self.shares_owned as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub period_index: usize,
    pub date: NaiveDate,
    pub price: f64,
    pub contribution: f64,
    pub asset_value: f64,
    pub shares_owned: u64,
    pub shares_acquired: u64,
    pub available_cash: f64,
    pub total_contributed: f64,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StepAnchor {
    /// The first observed year is a boundary with step index 0.
    #[default]
    SeriesStart,
    /// The first observed year is not a boundary; the first step lands
    /// `step_every_years` later with step index 0.
    SkipFirstYear,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StepRule {
    /// Each newly crossed boundary multiplies the running base by `step_factor^step_index`.
    #[default]
    Compound,
    /// Each newly crossed boundary resets the base to `base_amount * step_factor^step_index`.
    FromBase,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityBoost {
    pub boost_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearlyStepUp {
    pub step_every_years: u32,
    pub step_factor: f64,
    pub anchor: StepAnchor,
    pub rule: StepRule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub label: String,
    pub base_amount: f64,
    pub volatility_boost: Option<VolatilityBoost>,
    pub step_up: Option<YearlyStepUp>,
}

impl StrategyConfig {
    pub fn flat(label: impl Into<String>, base_amount: f64) -> Self {
        Self {
            label: label.into(),
            base_amount,
            volatility_boost: None,
            step_up: None,
        }
    }

    pub fn volatility_boosted(label: impl Into<String>, base_amount: f64, boost_fraction: f64) -> Self {
        Self {
            volatility_boost: Some(VolatilityBoost { boost_fraction }),
            ..Self::flat(label, base_amount)
        }
    }

    pub fn yearly_step_up(
        label: impl Into<String>,
        base_amount: f64,
        step_every_years: u32,
        step_factor: f64,
        anchor: StepAnchor,
    ) -> Self {
        Self {
            step_up: Some(YearlyStepUp {
                step_every_years,
                step_factor,
                anchor,
                rule: StepRule::default(),
            }),
            ..Self::flat(label, base_amount)
        }
    }

    /// Replaces the step rule of a configured step-up; no-op otherwise.
    pub fn with_step_rule(mut self, rule: StepRule) -> Self {
        if let Some(step) = self.step_up.as_mut() {
            step.rule = rule;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub final_asset_value: f64,
    pub total_contributed: f64,
    pub shares_owned: u64,
    pub return_ratio: f64,
    pub cagr_percent: f64,
    pub years_spanned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub label: String,
    pub summary: RunSummary,
    pub snapshots: Vec<LedgerSnapshot>,
}
