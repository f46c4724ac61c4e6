//! Quarterly observation schedule of the note.

use crate::{
    config::ProductConfig,
    error::{SimError, SimResult},
    types::Quarter,
};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationDate {
    pub index:             Quarter,
    pub date:              NaiveDate,
    pub autocall_eligible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSchedule {
    pub start:            NaiveDate,
    pub dates:            Vec<ObservationDate>,
    pub autocall_trigger: f64,
}

impl ObservationSchedule {
    /// Lay out `product.observations` dates, `months_per_observation`
    /// apart, starting one period after `start`.
    pub fn build(start: NaiveDate, product: &ProductConfig) -> SimResult<Self> {
        let dates = (1..=product.observations)
            .map(|index| {
                let months = index
                    .checked_mul(product.months_per_observation)
                    .ok_or_else(|| SimError::invalid("observation schedule overflows"))?;
                let date = start
                    .checked_add_months(Months::new(months))
                    .ok_or_else(|| SimError::invalid(format!("no calendar date {months} months after {start}")))?;
                Ok(ObservationDate {
                    index,
                    date,
                    autocall_eligible: product.autocall_quarters.contains(&index),
                })
            })
            .collect::<SimResult<Vec<_>>>()?;

        Ok(Self {
            start,
            dates,
            autocall_trigger: product.autocall_trigger,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Final observation, where the note matures if it never autocalled.
    pub fn maturity(&self) -> Option<&ObservationDate> {
        self.dates.last()
    }
}
