use std::collections::BTreeSet;

use chrono::Datelike;

use super::error::{Result, SimError};
use super::series::PriceSeries;
use super::types::{
    PriceObservation, StepAnchor, StepRule, StrategyConfig, VolatilityBoost, YearlyStepUp,
};

pub const MAX_BOOST_FRACTION: f64 = 0.25;

/// Per-run contribution rule built from a [`StrategyConfig`].
///
/// A flat policy returns the base amount every period. A step-up raises the
/// effective base at year boundaries counted from the first observed year, and a
/// volatility boost scales the effective base by [`boost_multiplier`]. When both
/// are configured the step-up picks the base and the boost applies on top.
///
/// Step-up boundaries are `first_year + k * step_every_years`. With
/// [`StepAnchor::SeriesStart`] the first year is boundary `k = 0` with step index
/// 0. With [`StepAnchor::SkipFirstYear`] the first year is not a boundary: the
/// boundary at `first_year + step_every_years` has step index 0, the next one
/// index 1, and so on.
///
/// On entering a boundary year the effective base is multiplied by
/// `step_factor^step_index` ([`StepRule::Compound`], so factor 2 gives 1x, 2x, 8x,
/// 64x) or reset to `base_amount * step_factor^step_index` ([`StepRule::FromBase`],
/// 1x, 2x, 4x, 8x). Each boundary year is applied at most once, and a boundary
/// year with no observations is applied on the next observation after it.
#[derive(Debug, Clone)]
pub struct ContributionPolicy {
    base_amount: f64,
    boost: Option<VolatilityBoost>,
    step_up: Option<StepUpState>,
}

#[derive(Debug, Clone)]
struct StepUpState {
    config: YearlyStepUp,
    first_year: i32,
    stepped_years: BTreeSet<i32>,
    effective_base: f64,
}

impl ContributionPolicy {
    pub fn new(config: &StrategyConfig, series: &PriceSeries) -> Result<Self> {
        if !config.base_amount.is_finite() || config.base_amount <= 0.0 {
            return Err(SimError::invalid_configuration(
                "base_amount",
                format!("must be a positive amount, got {}", config.base_amount),
            ));
        }

        if let Some(boost) = config.volatility_boost {
            validate_boost_fraction(boost.boost_fraction)?;
        }

        let step_up = match config.step_up {
            Some(step) => {
                validate_step_up(&step, series)?;
                Some(StepUpState {
                    config: step,
                    first_year: series.first_year().unwrap_or_default(),
                    stepped_years: BTreeSet::new(),
                    effective_base: config.base_amount,
                })
            }
            None => None,
        };

        Ok(Self {
            base_amount: config.base_amount,
            boost: config.volatility_boost,
            step_up,
        })
    }

    /// Amount to deposit for `observation`. Must be called in chronological order.
    pub fn contribution_for(&mut self, observation: &PriceObservation) -> f64 {
        let base = match self.step_up.as_mut() {
            Some(state) => state.base_for_year(self.base_amount, observation.date.year()),
            None => self.base_amount,
        };

        match self.boost {
            Some(boost) => boost_multiplier(observation.percentage_change, boost.boost_fraction) * base,
            None => base,
        }
    }
}

impl StepUpState {
    fn base_for_year(&mut self, base_amount: f64, year: i32) -> f64 {
        let Some(latest) = self.latest_boundary(year) else {
            return self.effective_base;
        };
        let first = match self.config.anchor {
            StepAnchor::SeriesStart => 0,
            StepAnchor::SkipFirstYear => 1,
        };

        for k in first..=latest {
            let boundary_year = self.first_year + (k * self.config.step_every_years) as i32;
            if !self.stepped_years.insert(boundary_year) {
                continue;
            }
            let multiplier = self.config.step_factor.powi((k - first) as i32);
            self.effective_base = match self.config.rule {
                StepRule::Compound => self.effective_base * multiplier,
                StepRule::FromBase => base_amount * multiplier,
            };
        }
        self.effective_base
    }

    /// Boundary count `k` of the latest boundary at or before `year`.
    fn latest_boundary(&self, year: i32) -> Option<u32> {
        let offset = year - self.first_year;
        if offset < 0 {
            return None;
        }
        Some(offset as u32 / self.config.step_every_years)
    }
}

/// Contribution multiplier for a period whose index moved by `percentage_change`
/// percent. Buckets are half-open `[lower, upper)`; falls of more than 15% double
/// the contribution.
pub fn boost_multiplier(percentage_change: f64, boost_fraction: f64) -> f64 {
    if percentage_change >= 0.0 {
        1.0
    } else if percentage_change >= -5.0 {
        1.0 + boost_fraction
    } else if percentage_change >= -10.0 {
        1.0 + 2.0 * boost_fraction
    } else if percentage_change >= -15.0 {
        1.0 + 3.0 * boost_fraction
    } else {
        2.0
    }
}

fn validate_boost_fraction(boost_fraction: f64) -> Result<()> {
    if !(boost_fraction > 0.0 && boost_fraction <= MAX_BOOST_FRACTION) {
        return Err(SimError::invalid_configuration(
            "boost_fraction",
            format!("must be in (0, {MAX_BOOST_FRACTION}], got {boost_fraction}"),
        ));
    }
    Ok(())
}

fn validate_step_up(step: &YearlyStepUp, series: &PriceSeries) -> Result<()> {
    let years = series.distinct_years();
    if step.step_every_years == 0 || step.step_every_years as usize >= years {
        return Err(SimError::invalid_configuration(
            "step_every_years",
            format!(
                "must be a positive number of years below the {years} years spanned by the series, got {}",
                step.step_every_years
            ),
        ));
    }
    if !step.step_factor.is_finite() || step.step_factor <= 0.0 {
        return Err(SimError::invalid_configuration(
            "step_factor",
            format!("must be a positive number, got {}", step.step_factor),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn yearly_series(first_year: i32, years: i32) -> PriceSeries {
        let points = (0..years).flat_map(|y| {
            [1, 7].map(move |m| {
                (
                    NaiveDate::from_ymd_opt(first_year + y, m, 1).expect("valid date"),
                    100.0,
                )
            })
        });
        PriceSeries::from_points(points).expect("valid series")
    }

    fn contributions_by_year(policy: &mut ContributionPolicy, series: &PriceSeries) -> Vec<(i32, f64)> {
        series
            .iter()
            .map(|obs| (obs.date.year(), policy.contribution_for(obs)))
            .collect()
    }

    #[test]
    fn flat_policy_returns_base_every_period() {
        let series = yearly_series(2000, 3);
        let mut policy =
            ContributionPolicy::new(&StrategyConfig::flat("flat", 200.0), &series).expect("valid");
        for obs in series.iter() {
            assert_eq!(policy.contribution_for(obs), 200.0);
        }
    }

    #[test]
    fn boost_table_matches_buckets() {
        let b = 0.2;
        assert_approx(boost_multiplier(3.0, b), 1.0);
        assert_approx(boost_multiplier(0.0, b), 1.0);
        assert_approx(boost_multiplier(-0.1, b), 1.2);
        assert_approx(boost_multiplier(-5.0, b), 1.2);
        assert_approx(boost_multiplier(-5.01, b), 1.4);
        assert_approx(boost_multiplier(-10.0, b), 1.4);
        assert_approx(boost_multiplier(-10.5, b), 1.6);
        assert_approx(boost_multiplier(-15.0, b), 1.6);
        assert_approx(boost_multiplier(-15.01, b), 2.0);
        assert_approx(boost_multiplier(-60.0, b), 2.0);
    }

    #[test]
    fn boosted_contribution_for_twelve_percent_drop() {
        let series = PriceSeries::from_points([
            (NaiveDate::from_ymd_opt(2000, 1, 1).expect("date"), 100.0),
            (NaiveDate::from_ymd_opt(2000, 2, 1).expect("date"), 88.0),
        ])
        .expect("valid series");
        let mut policy = ContributionPolicy::new(
            &StrategyConfig::volatility_boosted("boost", 300.0, 0.15),
            &series,
        )
        .expect("valid");

        let obs = series.observations();
        assert_approx(obs[1].percentage_change, -12.0);
        assert_approx(policy.contribution_for(&obs[0]), 300.0);
        assert_approx(policy.contribution_for(&obs[1]), 435.0);
    }

    #[test]
    fn boost_fraction_outside_range_is_rejected() {
        let series = yearly_series(2000, 2);
        for fraction in [0.30, 0.0, -0.1, f64::NAN] {
            let err = ContributionPolicy::new(
                &StrategyConfig::volatility_boosted("boost", 300.0, fraction),
                &series,
            )
            .expect_err("out of range boost");
            assert_eq!(err.parameter(), Some("boost_fraction"));
        }
        ContributionPolicy::new(&StrategyConfig::volatility_boosted("boost", 300.0, 0.25), &series)
            .expect("ceiling is inclusive");
    }

    #[test]
    fn non_positive_base_amount_is_rejected() {
        let series = yearly_series(2000, 2);
        for amount in [0.0, -1.0, f64::INFINITY] {
            let err = ContributionPolicy::new(&StrategyConfig::flat("flat", amount), &series)
                .expect_err("invalid base");
            assert_eq!(err.parameter(), Some("base_amount"));
        }
    }

    #[test]
    fn step_years_must_be_below_distinct_years() {
        let series = yearly_series(2000, 4);
        for years in [0, 4, 5] {
            let err = ContributionPolicy::new(
                &StrategyConfig::yearly_step_up("step", 100.0, years, 1.1, StepAnchor::SeriesStart),
                &series,
            )
            .expect_err("invalid step years");
            assert_eq!(err.parameter(), Some("step_every_years"));
        }
        ContributionPolicy::new(
            &StrategyConfig::yearly_step_up("step", 100.0, 3, 1.1, StepAnchor::SeriesStart),
            &series,
        )
        .expect("3 < 4 years");
    }

    #[test]
    fn step_factor_must_be_positive() {
        let series = yearly_series(2000, 4);
        let err = ContributionPolicy::new(
            &StrategyConfig::yearly_step_up("step", 100.0, 2, 0.0, StepAnchor::SeriesStart),
            &series,
        )
        .expect_err("zero factor");
        assert_eq!(err.parameter(), Some("step_factor"));
    }

    #[test]
    fn series_start_year_is_step_boundary_zero() {
        let series = yearly_series(2000, 5);
        let mut policy = ContributionPolicy::new(
            &StrategyConfig::yearly_step_up("step", 100.0, 2, 2.0, StepAnchor::SeriesStart),
            &series,
        )
        .expect("valid");

        let got = contributions_by_year(&mut policy, &series);
        let expected = [
            (2000, 100.0),
            (2000, 100.0),
            (2001, 100.0),
            (2001, 100.0),
            (2002, 200.0),
            (2002, 200.0),
            (2003, 200.0),
            (2003, 200.0),
            (2004, 800.0),
            (2004, 800.0),
        ];
        assert_eq!(got.len(), expected.len());
        for ((year, amount), (exp_year, exp_amount)) in got.into_iter().zip(expected) {
            assert_eq!(year, exp_year);
            assert_approx(amount, exp_amount);
        }
    }

    #[test]
    fn skip_first_year_anchor_does_not_treat_start_year_as_boundary() {
        let series = yearly_series(2000, 7);
        let mut policy = ContributionPolicy::new(
            &StrategyConfig::yearly_step_up("step", 100.0, 2, 2.0, StepAnchor::SkipFirstYear),
            &series,
        )
        .expect("valid");

        let got = contributions_by_year(&mut policy, &series);
        let per_year: Vec<(i32, f64)> = got.chunks(2).map(|c| c[0]).collect();
        let expected = [
            (2000, 100.0),
            (2001, 100.0),
            (2002, 100.0),
            (2003, 100.0),
            (2004, 200.0),
            (2005, 200.0),
            (2006, 800.0),
        ];
        for ((year, amount), (exp_year, exp_amount)) in per_year.into_iter().zip(expected) {
            assert_eq!(year, exp_year);
            assert_approx(amount, exp_amount);
        }
    }

    #[test]
    fn step_applies_on_first_observation_after_a_gap_year() {
        let points = [
            (NaiveDate::from_ymd_opt(2000, 1, 1).expect("date"), 10.0),
            (NaiveDate::from_ymd_opt(2001, 1, 1).expect("date"), 10.0),
            (NaiveDate::from_ymd_opt(2003, 5, 1).expect("date"), 10.0),
        ];
        let series = PriceSeries::from_points(points).expect("valid series");
        let mut policy = ContributionPolicy::new(
            &StrategyConfig::yearly_step_up("step", 100.0, 2, 1.5, StepAnchor::SeriesStart),
            &series,
        )
        .expect("valid");

        let got = contributions_by_year(&mut policy, &series);
        assert_approx(got[0].1, 100.0);
        assert_approx(got[1].1, 100.0);
        assert_approx(got[2].1, 150.0);
    }

    #[test]
    fn step_up_and_boost_compose() {
        let points = [
            (NaiveDate::from_ymd_opt(2000, 1, 1).expect("date"), 100.0),
            (NaiveDate::from_ymd_opt(2001, 1, 1).expect("date"), 100.0),
            (NaiveDate::from_ymd_opt(2002, 1, 1).expect("date"), 80.0),
        ];
        let series = PriceSeries::from_points(points).expect("valid series");
        let mut config = StrategyConfig::yearly_step_up("both", 100.0, 1, 1.1, StepAnchor::SeriesStart);
        config.volatility_boost = Some(VolatilityBoost { boost_fraction: 0.1 });
        let mut policy = ContributionPolicy::new(&config, &series).expect("valid");

        let got = contributions_by_year(&mut policy, &series);
        assert_approx(got[0].1, 100.0);
        assert_approx(got[1].1, 110.0);
        // Base compounds to 110 * 1.1^2 = 133.1; the -20% drop doubles it.
        assert_approx(got[2].1, 266.2);
    }

    #[test]
    fn compound_rule_multiplies_running_base_and_from_base_resets() {
        let points = (2000..=2003)
            .map(|y| (NaiveDate::from_ymd_opt(y, 1, 1).expect("date"), 100.0));
        let series = PriceSeries::from_points(points).expect("valid series");
        let config = StrategyConfig::yearly_step_up("step", 100.0, 1, 2.0, StepAnchor::SeriesStart);

        let mut compound = ContributionPolicy::new(&config, &series).expect("valid");
        let got: Vec<f64> = series.iter().map(|o| compound.contribution_for(o)).collect();
        for (amount, expected) in got.into_iter().zip([100.0, 200.0, 800.0, 6400.0]) {
            assert_approx(amount, expected);
        }

        let config = config.with_step_rule(StepRule::FromBase);
        let mut from_base = ContributionPolicy::new(&config, &series).expect("valid");
        let got: Vec<f64> = series.iter().map(|o| from_base.contribution_for(o)).collect();
        for (amount, expected) in got.into_iter().zip([100.0, 200.0, 400.0, 800.0]) {
            assert_approx(amount, expected);
        }
    }

    #[test]
    fn compound_rule_applies_every_boundary_skipped_by_a_gap() {
        // Boundaries 2001 and 2002 have no observations; both apply in 2003.
        let points = [
            (NaiveDate::from_ymd_opt(2000, 1, 1).expect("date"), 10.0),
            (NaiveDate::from_ymd_opt(2003, 1, 1).expect("date"), 10.0),
            (NaiveDate::from_ymd_opt(2004, 1, 1).expect("date"), 10.0),
        ];
        let series = PriceSeries::from_points(points).expect("valid series");
        let mut policy = ContributionPolicy::new(
            &StrategyConfig::yearly_step_up("step", 100.0, 1, 2.0, StepAnchor::SeriesStart),
            &series,
        )
        .expect("valid");

        let got = contributions_by_year(&mut policy, &series);
        // 2003 applies indices 1, 2 and 3: 100 * 2 * 4 * 8.
        assert_approx(got[1].1, 6400.0);
        assert_approx(got[2].1, 6400.0 * 16.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_boost_multiplier_is_monotone_and_capped(
            a in -100.0f64..100.0,
            b in -100.0f64..100.0,
            fraction in 0.001f64..=0.25,
        ) {
            let (worse, better) = if a <= b { (a, b) } else { (b, a) };
            let m_worse = boost_multiplier(worse, fraction);
            let m_better = boost_multiplier(better, fraction);
            prop_assert!(m_worse >= m_better);
            prop_assert!((1.0..=2.0).contains(&m_worse));
            prop_assert!((1.0..=2.0).contains(&m_better));
        }
    }
}
