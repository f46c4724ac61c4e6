//! autocall-runner: headless front end for the autocall simulator.
//!
//! Usage:
//!   autocall-runner --db prices.db --import data/sample_prices.json
//!   autocall-runner --db prices.db --stocks AAPL,MSFT,NVDA --barrier 0.7 \
//!                   --coupon-rate 0.08 --investment 1000 --seed 42 --model gbm
//!   autocall-runner --db prices.db --ipc-mode
//!
//! In IPC mode each stdin line is one JSON request and each response is
//! one JSON line on stdout:
//!   {"type":"stock","ticker":"AAPL"}
//!   {"type":"simulate_autocall","stocks":[..],"barrier":0.7,
//!    "initial_investment":1000,"coupon_rate":0.08}
//!   {"type":"quit"}

use anyhow::{Context, Result};
use autocall_core::{
    config::{PathModelKind, SimConfig},
    engine::{build_path_model, AutocallSimulator},
    error::SimError,
    market_data::{lookup_stock, MarketDataProvider, MemoizedQuotes},
    outcome::SimulationOutcome,
    store::PriceStore,
    terms::SimulationRequest,
};
use chrono::NaiveDate;
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    Stock { ticker: String },
    SimulateAutocall(SimulationRequest),
    Quit,
}

#[derive(serde::Serialize)]
struct IpcError {
    error:  String,
    status: u16,
}

impl From<&SimError> for IpcError {
    fn from(e: &SimError) -> Self {
        Self { error: e.to_string(), status: e.status() }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let memoize = args.iter().any(|a| a == "--memoize");
    let db = arg_value(&args, "--db").unwrap_or(":memory:");

    let mut config = match arg_value(&args, "--config") {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    config.path_model.seed = parse_arg(&args, "--seed", config.path_model.seed)?;
    if let Some(model) = arg_value(&args, "--model") {
        config.path_model.kind = match model {
            "gbm" => PathModelKind::Gbm,
            "historical" => PathModelKind::Historical,
            other => anyhow::bail!("unknown --model '{other}' (expected gbm or historical)"),
        };
    }
    if let Some(anchor) = arg_value(&args, "--replay-anchor") {
        config.path_model.replay_anchor = Some(parse_date(anchor)?);
    }
    config.validate()?;
    let start = arg_value(&args, "--start").map(parse_date).transpose()?;

    let store = PriceStore::open(db)?;
    store.migrate()?;
    if let Some(path) = arg_value(&args, "--import") {
        let json = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
        let bars = store.import_json(&json)?;
        log::info!("imported {bars} bars from {path}");
    }

    if ipc_mode {
        if memoize {
            let market = MemoizedQuotes::new(&store);
            return run_ipc_loop(&config, &market, Some(&store), start);
        }
        return run_ipc_loop(&config, &store, Some(&store), start);
    }

    let Some(stocks) = arg_value(&args, "--stocks") else {
        // Import-only invocation.
        return Ok(());
    };
    let request = SimulationRequest {
        stocks:             stocks.split(',').map(str::to_string).collect(),
        barrier:            parse_arg(&args, "--barrier", 0.7)?,
        initial_investment: parse_arg(&args, "--investment", 1000.0)?,
        coupon_rate:        parse_arg(&args, "--coupon-rate", 0.08)?,
    };

    println!("Autocall Desk: autocall-runner");
    println!("  stocks:     {}", request.stocks.join(", "));
    println!("  barrier:    {}", request.barrier);
    println!("  coupon:     {}", request.coupon_rate);
    println!("  investment: {}", request.initial_investment);
    println!("  model:      {:?}", config.path_model.kind);
    println!("  seed:       {}", config.path_model.seed);
    println!("  db:         {db}");
    println!();

    let outcome = simulate_once(&config, &store, Some(&store), &request, start)?;
    print_summary(&outcome);
    Ok(())
}

fn run_ipc_loop(
    config: &SimConfig,
    market: &dyn MarketDataProvider,
    store: Option<&PriceStore>,
    start: Option<NaiveDate>,
) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    let mut served: u64 = 0;

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                let err = IpcError { error: e.to_string(), status: 400 };
                writeln!(stdout, "{}", serde_json::to_string(&err)?)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match request {
            IpcRequest::Quit => break,
            IpcRequest::Stock { ticker } => {
                lookup_stock(market, &ticker).and_then(|q| Ok(serde_json::to_string(&q)?))
            }
            IpcRequest::SimulateAutocall(body) => {
                // Each request draws its own GBM stream; the sequence stays reproducible.
                let mut run_config = config.clone();
                run_config.path_model.seed = config.path_model.seed.wrapping_add(served);
                served += 1;
                simulate_once(&run_config, market, store, &body, start)
                    .and_then(|o| Ok(serde_json::to_string(&o)?))
            }
        };

        match response {
            Ok(json) => writeln!(stdout, "{json}")?,
            Err(e) => {
                log::warn!("request failed: {e}");
                writeln!(stdout, "{}", serde_json::to_string(&IpcError::from(&e))?)?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn simulate_once(
    config: &SimConfig,
    market: &dyn MarketDataProvider,
    store: Option<&PriceStore>,
    request: &SimulationRequest,
    start: Option<NaiveDate>,
) -> Result<SimulationOutcome, SimError> {
    let simulator = AutocallSimulator::new(config.clone(), market);
    let mut paths = build_path_model(config, store)?;
    match start {
        Some(start) => simulator.simulate_from(request, start, paths.as_mut()),
        None => simulator.simulate(request, paths.as_mut()),
    }
}

fn print_summary(outcome: &SimulationOutcome) {
    println!("=== SIMULATION {} ===", outcome.simulation_id);
    println!("  start:   {}", outcome.start_date);
    println!("  model:   {}", outcome.price_model);
    for u in &outcome.stock_info {
        println!(
            "  {:<6} initial {:>10.2}  barrier {:>10.2}",
            u.ticker, u.initial_price, u.barrier_price
        );
    }
    println!();
    println!("  Q   date        worst    ratio   coupon    settlement");
    for r in &outcome.quarterly_results {
        let settlement = r
            .settlement_amount
            .zip(r.redemption)
            .map(|(s, kind)| format!("{s:.2} ({kind:?})"))
            .unwrap_or_default();
        println!(
            "  {:<3} {}  {:<6} {:>7.4}  {:>7.2}   {}",
            r.quarter, r.observation_date, r.worst_performer, r.worst_ratio, r.coupon_amount, settlement
        );
    }
    println!();
    println!("  total coupons: {:.2}", outcome.total_coupons);
    println!("  total payout:  {:.2}", outcome.total_payout);
}

/// Value of `flag`, or `default` when the flag is absent. A value that
/// does not parse is an error.
fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match arg_value(args, flag) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("bad value for {flag}: '{raw}' ({e})")),
        None => Ok(default),
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("bad date '{raw}', expected YYYY-MM-DD"))
}
