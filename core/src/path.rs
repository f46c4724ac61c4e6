//! Price-path providers.
//!
//! RULE: The engine never models price dynamics itself. Prices at each
//! observation date come from a PricePathProvider, one row per
//! observation, one column per underlying (in ticker order).
//!
//! Three models are provided:
//!   - GbmPathModel:     correlated geometric Brownian motion, seeded.
//!   - HistoricalReplay: replays recorded returns from the price store.
//!   - ScriptedPaths:    caller-supplied rows.

use crate::{
    config::PathModelConfig,
    error::{SimError, SimResult},
    outcome::Underlying,
    rng::{PathRng, RngStream},
    schedule::ObservationSchedule,
    store::PriceStore,
};
use chrono::{Datelike, Months, NaiveDate};

/// Observed prices, `rows[observation][underlying]`.
pub type PricePaths = Vec<Vec<f64>>;

pub trait PricePathProvider {
    /// Stable label reported in the simulation outcome.
    fn name(&self) -> &'static str;

    /// Produce one row of prices per observation in `schedule`.
    fn observe(
        &mut self,
        underlyings: &[Underlying],
        schedule: &ObservationSchedule,
    ) -> SimResult<PricePaths>;
}

// ── GBM ────────────────────────────────────────────────────────

/// Equicorrelated geometric Brownian motion under the real-world drift.
///
/// Each step spans the calendar gap between observations, measured in
/// years (ACT/365). Log-returns per step are
/// `(mu - sigma^2 / 2) dt + sigma sqrt(dt) (L z)` with `L` the Cholesky
/// factor of the correlation matrix.
pub struct GbmPathModel {
    drift:       f64,
    volatility:  f64,
    correlation: f64,
    rng:         PathRng,
}

impl GbmPathModel {
    pub fn new(drift: f64, volatility: f64, correlation: f64, seed: u64) -> Self {
        Self {
            drift,
            volatility,
            correlation,
            rng: PathRng::new(seed, RngStream::PricePath),
        }
    }

    pub fn from_config(config: &PathModelConfig) -> Self {
        Self::new(config.drift, config.volatility, config.correlation, config.seed)
    }
}

impl PricePathProvider for GbmPathModel {
    fn name(&self) -> &'static str { "gbm" }

    fn observe(
        &mut self,
        underlyings: &[Underlying],
        schedule: &ObservationSchedule,
    ) -> SimResult<PricePaths> {
        let n = underlyings.len();
        let chol = cholesky_lower(&equicorrelation(n, self.correlation)).ok_or_else(|| {
            SimError::invalid(format!(
                "correlation {} does not give a positive semi-definite matrix",
                self.correlation
            ))
        })?;

        let mut state: Vec<f64> = underlyings.iter().map(|u| u.initial_price).collect();
        let mut previous = schedule.start;
        let mut rows = Vec::with_capacity(schedule.len());
        let mut indep = vec![0.0_f64; n];

        for obs in &schedule.dates {
            let dt = (obs.date - previous).num_days() as f64 / 365.0;
            previous = obs.date;
            let drift = (self.drift - 0.5 * self.volatility * self.volatility) * dt;
            let vol_dt = self.volatility * dt.sqrt();

            for z in &mut indep {
                *z = self.rng.standard_normal();
            }
            for (i, spot) in state.iter_mut().enumerate() {
                let shock: f64 = (0..=i).map(|k| chol[i][k] * indep[k]).sum();
                *spot *= (drift + vol_dt * shock).exp();
            }
            rows.push(state.clone());
        }
        Ok(rows)
    }
}

fn equicorrelation(n: usize, rho: f64) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { rho }).collect())
        .collect()
}

/// Lower-triangular Cholesky factor, or None if the matrix is not PSD.
fn cholesky_lower(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let tol = 1.0e-12;
    let mut l = vec![vec![0.0_f64; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum < -tol {
                    return None;
                }
                l[i][j] = sum.max(0.0).sqrt();
            } else if l[j][j] > tol {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

// ── Historical replay ──────────────────────────────────────────

/// Replays recorded returns: the price at observation q is
/// `initial * close(anchor + m_q) / close(anchor)`, where `m_q` is the
/// number of calendar months from the schedule start to observation q
/// and each close is the last bar on or before the date. With no
/// explicit anchor, the replay window ends at the schedule start or at
/// the earliest of the underlyings' last recorded bars, whichever comes
/// first, so the most recent history of the same length is replayed.
/// A replay date past a ticker's last bar is an error: the close would
/// be carried forward flat.
pub struct HistoricalReplay<'a> {
    store:  &'a PriceStore,
    anchor: Option<NaiveDate>,
}

impl<'a> HistoricalReplay<'a> {
    pub fn new(store: &'a PriceStore, anchor: Option<NaiveDate>) -> Self {
        Self { store, anchor }
    }

    fn last_bar_date(&self, ticker: &str) -> SimResult<NaiveDate> {
        self.store
            .latest_bars(ticker, 1)?
            .first()
            .map(|bar| bar.date)
            .ok_or_else(|| SimError::upstream(ticker, "no price history"))
    }

    fn close_at(&self, ticker: &str, date: NaiveDate) -> SimResult<f64> {
        let (_, close) = self
            .store
            .close_on_or_before(ticker, date)?
            .ok_or_else(|| SimError::upstream(ticker, format!("no price history on or before {date}")))?;
        if !(close.is_finite() && close > 0.0) {
            return Err(SimError::upstream(ticker, format!("recorded close {close} on {date} is unusable")));
        }
        Ok(close)
    }
}

fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    months.max(0) as u32
}

fn shift_months(date: NaiveDate, months: u32, forward: bool) -> SimResult<NaiveDate> {
    let shifted = if forward {
        date.checked_add_months(Months::new(months))
    } else {
        date.checked_sub_months(Months::new(months))
    };
    shifted.ok_or_else(|| SimError::invalid(format!("replay date {months} months from {date} is out of range")))
}

impl PricePathProvider for HistoricalReplay<'_> {
    fn name(&self) -> &'static str { "historical" }

    fn observe(
        &mut self,
        underlyings: &[Underlying],
        schedule: &ObservationSchedule,
    ) -> SimResult<PricePaths> {
        let horizon = schedule
            .maturity()
            .map(|m| months_between(schedule.start, m.date))
            .unwrap_or(0);
        let last_bars = underlyings
            .iter()
            .map(|u| self.last_bar_date(&u.ticker))
            .collect::<SimResult<Vec<_>>>()?;
        let anchor = match self.anchor {
            Some(anchor) => anchor,
            None => {
                let window_end = last_bars.iter().copied().fold(schedule.start, NaiveDate::min);
                shift_months(window_end, horizon, false)?
            }
        };

        let anchors = underlyings
            .iter()
            .map(|u| self.close_at(&u.ticker, anchor))
            .collect::<SimResult<Vec<_>>>()?;

        schedule
            .dates
            .iter()
            .map(|obs| {
                let replay_date = shift_months(anchor, months_between(schedule.start, obs.date), true)?;
                log::debug!("quarter={} replays {replay_date}", obs.index);
                underlyings
                    .iter()
                    .zip(&anchors)
                    .zip(&last_bars)
                    .map(|((u, base), last)| {
                        if replay_date > *last {
                            return Err(SimError::upstream(
                                &u.ticker,
                                format!("no price history after {last} (replay needs {replay_date})"),
                            ));
                        }
                        self.close_at(&u.ticker, replay_date)
                            .map(|close| u.initial_price * close / base)
                    })
                    .collect::<SimResult<Vec<_>>>()
            })
            .collect()
    }
}

// ── Scripted ───────────────────────────────────────────────────

/// Prices expressed as ratios of each underlying's initial price.
pub struct ScriptedPaths {
    ratios: Vec<Vec<f64>>,
}

impl ScriptedPaths {
    pub fn from_ratios(ratios: Vec<Vec<f64>>) -> Self {
        Self { ratios }
    }

    /// Every underlying stays at `ratio` of its initial price throughout.
    pub fn flat(ratio: f64, observations: usize, underlyings: usize) -> Self {
        Self::from_ratios(vec![vec![ratio; underlyings]; observations])
    }
}

impl PricePathProvider for ScriptedPaths {
    fn name(&self) -> &'static str { "scripted" }

    fn observe(
        &mut self,
        underlyings: &[Underlying],
        _schedule: &ObservationSchedule,
    ) -> SimResult<PricePaths> {
        self.ratios
            .iter()
            .map(|row| {
                if row.len() != underlyings.len() {
                    return Err(SimError::InternalComputation(format!(
                        "scripted row has {} prices for {} underlyings",
                        row.len(),
                        underlyings.len()
                    )));
                }
                Ok(row
                    .iter()
                    .zip(underlyings)
                    .map(|(ratio, u)| u.initial_price * ratio)
                    .collect())
            })
            .collect()
    }
}
