use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use super::error::{Result, SimError};
use super::types::PriceObservation;

/// Chronological index prices, validated once and shared read-only by every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    observations: Vec<PriceObservation>,
    distinct_years: usize,
}

impl PriceSeries {
    pub fn from_points<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut observations: Vec<PriceObservation> = Vec::new();
        let mut years = BTreeSet::new();

        for (period_index, (date, price)) in points.into_iter().enumerate() {
            if !price.is_finite() || price <= 0.0 {
                return Err(SimError::invalid_observation(
                    period_index,
                    format!("price must be a positive number, got {price}"),
                ));
            }

            let percentage_change = match observations.last() {
                Some(prev) => {
                    if date < prev.date {
                        return Err(SimError::invalid_observation(
                            period_index,
                            format!("date {date} is earlier than previous date {}", prev.date),
                        ));
                    }
                    (price - prev.price) / prev.price * 100.0
                }
                None => 0.0,
            };

            years.insert(date.year());
            observations.push(PriceObservation {
                period_index,
                date,
                price,
                percentage_change,
            });
        }

        Ok(Self {
            observations,
            distinct_years: years.len(),
        })
    }

    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PriceObservation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&PriceObservation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&PriceObservation> {
        self.observations.last()
    }

    pub fn first_year(&self) -> Option<i32> {
        self.first().map(|obs| obs.date.year())
    }

    /// Number of distinct calendar years with at least one observation.
    ///
    /// Years inside the series range with no observations are not counted, so
    /// 2000 and 2005 alone give 2. This is the year count used by the CAGR and
    /// by step-up validation.
    pub fn distinct_years(&self) -> usize {
        self.distinct_years
    }
}

impl<'a> IntoIterator for &'a PriceSeries {
    type Item = &'a PriceObservation;
    type IntoIter = std::slice::Iter<'a, PriceObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
