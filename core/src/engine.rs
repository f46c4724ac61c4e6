//! The autocall simulator: the heart of the desk.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Validate the request (no collaborator is touched on failure).
//!   2. Resolve the three current quotes concurrently.
//!   3. Fix initial and barrier prices.
//!   4. Ask the price-path provider for every observation.
//!   5. Walk the observations: coupon, autocall, maturity.
//!   6. Assemble the outcome.
//!
//! RULES:
//!   - Any failure aborts the whole run. No partial results.
//!   - Barrier prices are fixed in step 3 and never recomputed.
//!   - Results stop at the first autocall.

use crate::{
    config::{PathModelKind, SimConfig},
    error::{SimError, SimResult},
    market_data::{resolve_quotes, MarketDataProvider},
    outcome::{QuarterlyResult, Redemption, SimulationOutcome, Underlying},
    path::{GbmPathModel, HistoricalReplay, PricePathProvider, PricePaths},
    schedule::ObservationSchedule,
    store::PriceStore,
    terms::{AutocallTerms, SimulationRequest},
};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;

pub struct AutocallSimulator<'a> {
    pub config: SimConfig,
    market:     &'a dyn MarketDataProvider,
}

impl<'a> AutocallSimulator<'a> {
    pub fn new(config: SimConfig, market: &'a dyn MarketDataProvider) -> Self {
        Self { config, market }
    }

    /// Run a simulation starting today (UTC).
    pub fn simulate(
        &self,
        request: &SimulationRequest,
        paths: &mut dyn PricePathProvider,
    ) -> SimResult<SimulationOutcome> {
        self.simulate_from(request, Utc::now().date_naive(), paths)
    }

    /// Run a simulation whose schedule starts on `start`.
    pub fn simulate_from(
        &self,
        request: &SimulationRequest,
        start: NaiveDate,
        paths: &mut dyn PricePathProvider,
    ) -> SimResult<SimulationOutcome> {
        let terms = request.validate()?;
        let schedule = ObservationSchedule::build(start, &self.config.product)?;

        let quotes = resolve_quotes(self.market, &terms.tickers)?;
        let underlyings: Vec<Underlying> = quotes
            .into_iter()
            .zip(&terms.tickers)
            .map(|(quote, ticker)| Underlying {
                ticker:        ticker.clone(),
                company_name:  quote.company_name,
                currency:      quote.currency,
                initial_price: quote.price,
                barrier_price: quote.price * terms.barrier,
            })
            .collect();

        let observed = paths.observe(&underlyings, &schedule)?;
        let quarterly_results = evaluate(&terms, &underlyings, &schedule, &observed)?;
        let outcome = assemble(&terms, start, paths.name(), underlyings, quarterly_results);

        log::info!(
            "simulation {} [{}] {:?}: {} observations, payout {:.2}",
            outcome.simulation_id,
            outcome.price_model,
            terms.tickers,
            outcome.quarterly_results.len(),
            outcome.total_payout
        );
        Ok(outcome)
    }
}

/// Build the price-path provider the configuration asks for.
/// The historical model needs a store to replay from.
pub fn build_path_model<'s>(
    config: &SimConfig,
    store: Option<&'s PriceStore>,
) -> SimResult<Box<dyn PricePathProvider + 's>> {
    match config.path_model.kind {
        PathModelKind::Gbm => Ok(Box::new(GbmPathModel::from_config(&config.path_model))),
        PathModelKind::Historical => {
            let store = store.ok_or_else(|| {
                SimError::invalid("historical path model requires a price database")
            })?;
            Ok(Box::new(HistoricalReplay::new(store, config.path_model.replay_anchor)))
        }
    }
}

/// Walk the observation schedule over already-generated prices.
///
/// Pure: the same inputs always give the same results.
pub fn evaluate(
    terms: &AutocallTerms,
    underlyings: &[Underlying],
    schedule: &ObservationSchedule,
    observed: &PricePaths,
) -> SimResult<Vec<QuarterlyResult>> {
    if observed.len() != schedule.len() {
        return Err(SimError::InternalComputation(format!(
            "price path has {} observations, schedule has {}",
            observed.len(),
            schedule.len()
        )));
    }
    let maturity = schedule
        .maturity()
        .map(|m| m.index)
        .ok_or_else(|| SimError::InternalComputation("empty observation schedule".into()))?;

    let principal = terms.initial_investment;
    let coupon = terms.quarterly_coupon();
    let mut results = Vec::with_capacity(schedule.len());

    for (obs, row) in schedule.dates.iter().zip(observed) {
        if row.len() != underlyings.len() {
            return Err(SimError::InternalComputation(format!(
                "quarter {}: {} prices for {} underlyings",
                obs.index,
                row.len(),
                underlyings.len()
            )));
        }

        let mut observed_prices = BTreeMap::new();
        let mut worst: Option<(&Underlying, f64)> = None;
        for (u, &price) in underlyings.iter().zip(row) {
            if !(price.is_finite() && price > 0.0) {
                return Err(SimError::InternalComputation(format!(
                    "quarter {}: unusable price {price} for {}",
                    obs.index, u.ticker
                )));
            }
            let ratio = price / u.initial_price;
            if worst.map_or(true, |(_, w)| ratio < w) {
                worst = Some((u, ratio));
            }
            observed_prices.insert(u.ticker.clone(), price);
        }
        let (worst_underlying, worst_ratio) = worst
            .ok_or_else(|| SimError::InternalComputation("no underlyings to observe".into()))?;

        let coupon_paid = worst_ratio >= terms.barrier;
        let coupon_amount = if coupon_paid { coupon } else { 0.0 };
        let autocalled = obs.autocall_eligible && worst_ratio >= schedule.autocall_trigger;

        let (settlement_amount, redemption) = if autocalled {
            (Some(principal + coupon_amount), Some(Redemption::Autocall))
        } else if obs.index == maturity {
            let repaid = if worst_ratio >= terms.barrier {
                principal
            } else {
                principal * worst_ratio
            };
            (Some(repaid), Some(Redemption::Maturity))
        } else {
            (None, None)
        };

        log::debug!(
            "quarter={} worst={} ratio={:.4} coupon={} autocall={}",
            obs.index,
            worst_underlying.ticker,
            worst_ratio,
            coupon_paid,
            autocalled
        );

        results.push(QuarterlyResult {
            quarter:          obs.index,
            observation_date: obs.date,
            observed_prices,
            worst_performer:  worst_underlying.ticker.clone(),
            worst_ratio,
            coupon_paid,
            coupon_amount,
            autocalled,
            settlement_amount,
            redemption,
        });

        if autocalled {
            break;
        }
    }
    Ok(results)
}

/// Totals count each coupon once: an autocall settlement already
/// contains that quarter's coupon, so only its principal part is added.
fn assemble(
    terms: &AutocallTerms,
    start: NaiveDate,
    price_model: &str,
    underlyings: Vec<Underlying>,
    quarterly_results: Vec<QuarterlyResult>,
) -> SimulationOutcome {
    let total_coupons: f64 = quarterly_results.iter().map(|r| r.coupon_amount).sum();
    let principal_repaid = quarterly_results
        .iter()
        .find_map(|r| match (r.redemption, r.settlement_amount) {
            (Some(Redemption::Autocall), Some(amount)) => Some(amount - r.coupon_amount),
            (Some(Redemption::Maturity), Some(amount)) => Some(amount),
            _ => None,
        })
        .unwrap_or(0.0);

    SimulationOutcome {
        simulation_id:        uuid::Uuid::new_v4().to_string(),
        initial_investment:   terms.initial_investment,
        barrier_level:        terms.barrier,
        annual_coupon_rate:   terms.coupon_rate,
        start_date:           start,
        price_model:          price_model.to_string(),
        initial_prices:       underlyings.iter().map(|u| (u.ticker.clone(), u.initial_price)).collect(),
        barrier_prices:       underlyings.iter().map(|u| (u.ticker.clone(), u.barrier_price)).collect(),
        stock_info:           underlyings,
        quarterly_results,
        total_coupons,
        total_payout:         total_coupons + principal_repaid,
        simulation_completed: true,
    }
}
