//! Payoff rules of the worst-of autocall, on scripted price paths.

use autocall_core::{
    config::SimConfig,
    engine::AutocallSimulator,
    market_data::StaticQuotes,
    outcome::{Redemption, SimulationOutcome},
    path::{GbmPathModel, ScriptedPaths},
    terms::SimulationRequest,
};
use chrono::NaiveDate;

fn market() -> StaticQuotes {
    StaticQuotes::new()
        .with_price("AAPL", 190.0)
        .with_price("MSFT", 410.0)
        .with_price("NVDA", 880.0)
}

fn request(barrier: f64, coupon_rate: f64, investment: f64) -> SimulationRequest {
    SimulationRequest {
        stocks:             vec!["AAPL".into(), "MSFT".into(), "NVDA".into()],
        barrier,
        initial_investment: investment,
        coupon_rate,
    }
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

fn run(paths: &mut ScriptedPaths, req: &SimulationRequest) -> SimulationOutcome {
    let market = market();
    let sim = AutocallSimulator::new(SimConfig::default_test(), &market);
    sim.simulate_from(req, start(), paths).expect("simulation should succeed")
}

#[test]
fn flat_underlyings_autocall_at_first_annual_observation() {
    let mut paths = ScriptedPaths::flat(1.0, 12, 3);
    let outcome = run(&mut paths, &request(0.7, 0.08, 1000.0));

    assert!(outcome.simulation_completed);
    assert_eq!(outcome.quarterly_results.len(), 4, "Should stop right after the Q4 autocall");

    let q4 = &outcome.quarterly_results[3];
    assert_eq!(q4.quarter, 4);
    assert!(q4.autocalled);
    assert!(q4.coupon_paid);
    assert!((q4.coupon_amount - 20.0).abs() < 1e-9, "coupon = 1000 * 0.08 / 4");
    assert_eq!(q4.redemption, Some(Redemption::Autocall));
    assert!((q4.settlement_amount.unwrap() - 1020.0).abs() < 1e-9, "principal + final coupon");

    for early in &outcome.quarterly_results[..3] {
        assert!(!early.autocalled, "Q{} is not autocall-eligible", early.quarter);
        assert!(early.coupon_paid);
        assert!(early.settlement_amount.is_none());
    }

    // 4 coupons of 20 plus the principal, counted once.
    assert!((outcome.total_coupons - 80.0).abs() < 1e-9);
    assert!((outcome.total_payout - 1080.0).abs() < 1e-9);
}

#[test]
fn worst_performer_at_half_loses_half_the_principal() {
    let mut rows = vec![vec![0.9, 1.1, 1.2]; 11];
    rows.push(vec![0.5, 1.2, 1.3]);
    let mut paths = ScriptedPaths::from_ratios(rows);
    let outcome = run(&mut paths, &request(0.7, 0.08, 1000.0));

    assert_eq!(outcome.quarterly_results.len(), 12);
    assert!(!outcome.autocalled(), "worst ratio never reached 1.0");

    let last = outcome.quarterly_results.last().unwrap();
    assert_eq!(last.worst_performer, "AAPL");
    assert_eq!(last.worst_ratio, 0.5);
    assert!(!last.coupon_paid, "no coupon below the barrier");
    assert_eq!(last.coupon_amount, 0.0);
    assert_eq!(last.redemption, Some(Redemption::Maturity));
    assert_eq!(last.settlement_amount, Some(500.0));
}

#[test]
fn maturity_above_barrier_returns_full_principal() {
    let mut paths = ScriptedPaths::from_ratios(vec![vec![0.8, 0.95, 1.05]; 12]);
    let outcome = run(&mut paths, &request(0.7, 0.08, 1000.0));

    let last = outcome.quarterly_results.last().unwrap();
    assert_eq!(outcome.quarterly_results.len(), 12);
    assert!(last.coupon_paid);
    assert_eq!(last.settlement_amount, Some(1000.0));
    assert!((outcome.total_payout - (1000.0 + 12.0 * 20.0)).abs() < 1e-9);
}

#[test]
fn barrier_is_inclusive_for_coupons() {
    let mut paths = ScriptedPaths::from_ratios(vec![vec![0.75, 1.0, 1.0]; 12]);
    let outcome = run(&mut paths, &request(0.75, 0.04, 1000.0));

    assert!(outcome.quarterly_results.iter().all(|r| r.coupon_paid));
    assert_eq!(outcome.quarterly_results.last().unwrap().settlement_amount, Some(1000.0));
}

#[test]
fn autocall_only_checked_on_annual_observations() {
    // At 1.0 on Q1..Q3 and dipping on Q4, back to 1.0 from Q5.
    let mut rows = vec![vec![1.0, 1.0, 1.0]; 3];
    rows.push(vec![0.99, 1.0, 1.0]);
    rows.extend(vec![vec![1.0, 1.0, 1.0]; 8]);
    let mut paths = ScriptedPaths::from_ratios(rows);
    let outcome = run(&mut paths, &request(0.7, 0.08, 1000.0));

    assert_eq!(outcome.quarterly_results.len(), 8, "Q8 is the next annual observation");
    assert!(outcome.quarterly_results[7].autocalled);
    assert!(outcome.quarterly_results[..7].iter().all(|r| !r.autocalled));
}

#[test]
fn barrier_prices_fixed_from_initial_quotes() {
    let mut paths = ScriptedPaths::flat(0.9, 12, 3);
    let outcome = run(&mut paths, &request(0.65, 0.05, 5000.0));

    for u in &outcome.stock_info {
        assert_eq!(u.barrier_price, u.initial_price * 0.65);
        assert_eq!(outcome.barrier_prices[&u.ticker], u.initial_price * 0.65);
        assert_eq!(outcome.initial_prices[&u.ticker], u.initial_price);
    }
    assert_eq!(outcome.initial_prices["NVDA"], 880.0);
}

#[test]
fn observation_dates_are_quarterly_from_start() {
    let mut paths = ScriptedPaths::flat(0.9, 12, 3);
    let outcome = run(&mut paths, &request(0.7, 0.08, 1000.0));

    let dates: Vec<_> = outcome.quarterly_results.iter().map(|r| r.observation_date).collect();
    assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 4, 15).unwrap());
    assert_eq!(dates[11], NaiveDate::from_ymd_opt(2027, 1, 15).unwrap());
}

#[test]
fn payoff_invariants_hold_across_many_gbm_paths() {
    let market = market();
    let sim = AutocallSimulator::new(SimConfig::default_test(), &market);
    let req = request(0.7, 0.08, 1000.0);

    for seed in 0..200u64 {
        let mut model = GbmPathModel::new(0.02, 0.30, 0.4, seed);
        let outcome = sim.simulate_from(&req, start(), &mut model).unwrap();
        let results = &outcome.quarterly_results;

        assert!(!results.is_empty() && results.len() <= 12, "seed {seed}: {} results", results.len());

        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.quarter as usize, i + 1);
            assert_eq!(r.coupon_paid, r.worst_ratio >= 0.7, "seed {seed} Q{}", r.quarter);

            let eligible = matches!(r.quarter, 4 | 8 | 12);
            assert_eq!(r.autocalled, eligible && r.worst_ratio >= 1.0, "seed {seed} Q{}", r.quarter);

            if r.autocalled {
                assert_eq!(i, results.len() - 1, "seed {seed}: results continue after autocall");
            }
        }

        let last = results.last().unwrap();
        assert!(last.settlement_amount.is_some(), "seed {seed}: note never redeemed");
        if !last.autocalled {
            assert_eq!(last.quarter, 12);
            let expected = if last.worst_ratio >= 0.7 { 1000.0 } else { 1000.0 * last.worst_ratio };
            assert_eq!(last.settlement_amount, Some(expected));
        }
    }
}

#[test]
fn every_run_gets_a_fresh_simulation_id() {
    let a = run(&mut ScriptedPaths::flat(1.0, 12, 3), &request(0.7, 0.08, 1000.0));
    let b = run(&mut ScriptedPaths::flat(1.0, 12, 3), &request(0.7, 0.08, 1000.0));
    assert_ne!(a.simulation_id, b.simulation_id);
    assert_eq!(a.quarterly_results, b.quarterly_results);
}

#[test]
fn outcome_serializes_with_contract_field_names() {
    let outcome = run(&mut ScriptedPaths::flat(1.0, 12, 3), &request(0.7, 0.08, 1000.0));
    let json: serde_json::Value = serde_json::to_value(&outcome).unwrap();

    for field in [
        "simulation_id",
        "initial_investment",
        "barrier_level",
        "annual_coupon_rate",
        "stock_info",
        "initial_prices",
        "barrier_prices",
        "quarterly_results",
        "simulation_completed",
    ] {
        assert!(json.get(field).is_some(), "missing field {field}");
    }
    assert_eq!(json["quarterly_results"][3]["redemption"], "autocall");
    assert_eq!(json["barrier_prices"]["AAPL"], 190.0 * 0.7);
}
