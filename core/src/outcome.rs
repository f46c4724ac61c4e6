//! Result types returned by a simulation run.
//!
//! Field names match the `simulate_autocall` response body.

use crate::types::{Quarter, SimulationId, Ticker};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One underlying of the note, fixed at simulation start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Underlying {
    pub ticker:        Ticker,
    pub company_name:  Option<String>,
    pub currency:      Option<String>,
    pub initial_price: f64,
    /// initial_price * barrier level. Never recomputed.
    pub barrier_price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Redemption {
    Autocall,
    Maturity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuarterlyResult {
    pub quarter:           Quarter,
    pub observation_date:  NaiveDate,
    pub observed_prices:   BTreeMap<Ticker, f64>,
    pub worst_performer:   Ticker,
    pub worst_ratio:       f64,
    pub coupon_paid:       bool,
    pub coupon_amount:     f64,
    pub autocalled:        bool,
    /// Present on the observation where the note redeems.
    pub settlement_amount: Option<f64>,
    pub redemption:        Option<Redemption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationOutcome {
    pub simulation_id:        SimulationId,
    pub initial_investment:   f64,
    pub barrier_level:        f64,
    pub annual_coupon_rate:   f64,
    pub start_date:           NaiveDate,
    pub price_model:          String,
    pub stock_info:           Vec<Underlying>,
    pub initial_prices:       BTreeMap<Ticker, f64>,
    pub barrier_prices:       BTreeMap<Ticker, f64>,
    pub quarterly_results:    Vec<QuarterlyResult>,
    pub total_coupons:        f64,
    pub total_payout:         f64,
    pub simulation_completed: bool,
}

impl SimulationOutcome {
    /// The observation on which the note redeemed, if any.
    pub fn redemption(&self) -> Option<&QuarterlyResult> {
        self.quarterly_results
            .iter()
            .find(|r| r.settlement_amount.is_some())
    }

    pub fn autocalled(&self) -> bool {
        self.quarterly_results.iter().any(|r| r.autocalled)
    }
}
