//! The simulation request and its validated form.
//!
//! RULE: Every parameter is checked here, before any price lookup.
//! A request that fails validation never reaches a collaborator.

use crate::{
    error::{SimError, SimResult},
    types::{Ticker, UNDERLYING_COUNT},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Body of a `simulate_autocall` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationRequest {
    pub stocks:             Vec<String>,
    pub barrier:            f64,
    pub initial_investment: f64,
    pub coupon_rate:        f64,
}

/// Economic terms of the note once the request has been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct AutocallTerms {
    pub tickers:            [Ticker; UNDERLYING_COUNT],
    pub barrier:            f64,
    pub coupon_rate:        f64,
    pub initial_investment: f64,
}

impl AutocallTerms {
    /// Coupon paid on each observation where the barrier holds.
    pub fn quarterly_coupon(&self) -> f64 {
        self.coupon_rate / 4.0 * self.initial_investment
    }
}

impl SimulationRequest {
    pub fn validate(&self) -> SimResult<AutocallTerms> {
        if self.stocks.len() != UNDERLYING_COUNT {
            return Err(SimError::invalid(format!(
                "exactly {UNDERLYING_COUNT} stocks are required, got {}",
                self.stocks.len()
            )));
        }

        let normalised: Vec<Ticker> = self
            .stocks
            .iter()
            .map(|t| normalise_ticker(t))
            .collect::<SimResult<_>>()?;

        let mut seen = HashSet::new();
        if let Some(dup) = normalised.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(SimError::invalid(format!("duplicate stock '{dup}'")));
        }

        if !(self.barrier.is_finite() && self.barrier > 0.0 && self.barrier <= 1.0) {
            return Err(SimError::invalid(format!(
                "barrier must be within (0, 1], got {}",
                self.barrier
            )));
        }
        if !(self.coupon_rate.is_finite() && self.coupon_rate >= 0.0) {
            return Err(SimError::invalid(format!(
                "coupon_rate must be >= 0, got {}",
                self.coupon_rate
            )));
        }
        if !(self.initial_investment.is_finite() && self.initial_investment > 0.0) {
            return Err(SimError::invalid(format!(
                "initial_investment must be > 0, got {}",
                self.initial_investment
            )));
        }

        let tickers: [Ticker; UNDERLYING_COUNT] = normalised
            .try_into()
            .map_err(|_| SimError::InternalComputation("ticker count changed during validation".into()))?;

        Ok(AutocallTerms {
            tickers,
            barrier:            self.barrier,
            coupon_rate:        self.coupon_rate,
            initial_investment: self.initial_investment,
        })
    }
}

/// Trim and upper-case a ticker. Empty tickers are rejected.
pub fn normalise_ticker(raw: &str) -> SimResult<Ticker> {
    let ticker = raw.trim().to_ascii_uppercase();
    if ticker.is_empty() {
        return Err(SimError::invalid("Ticker symbol required"));
    }
    Ok(ticker)
}
