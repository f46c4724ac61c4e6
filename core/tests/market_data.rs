//! Price store, quote lookup and the memo cache.

use autocall_core::{
    error::{SimError, SimResult},
    market_data::{lookup_stock, resolve_quotes, MarketDataProvider, MemoizedQuotes, StaticQuotes, StockQuote},
    store::{PriceBar, PriceStore},
};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seeded_store() -> PriceStore {
    let store = PriceStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store.upsert_instrument("AAPL", Some("Apple Inc."), Some("USD")).unwrap();
    for (d, close) in [(date(2024, 3, 1), 180.0), (date(2024, 3, 4), 182.5), (date(2024, 3, 5), 185.25)] {
        store
            .insert_bar("AAPL", &PriceBar {
                date:   d,
                high:   Some(close + 2.0),
                low:    Some(close - 2.0),
                close,
                volume: Some(1_000_000),
            })
            .unwrap();
    }
    store
}

#[test]
fn store_quote_uses_latest_bar() {
    let store = seeded_store();
    let quote = store.current_quote("AAPL").unwrap();

    assert_eq!(quote.price, 185.25);
    assert_eq!(quote.last_price, Some(182.5), "previous bar's close");
    assert_eq!(quote.day_high, Some(187.25));
    assert_eq!(quote.day_low, Some(183.25));
    assert_eq!(quote.company_name.as_deref(), Some("Apple Inc."));
    assert_eq!(quote.data_timestamp.as_deref(), Some("2024-03-05"));
    assert_eq!(quote.volume, Some(1_000_000));
}

#[test]
fn unknown_ticker_is_404_and_empty_history_is_502() {
    let store = seeded_store();
    let unknown = store.current_quote("ZZZZ").unwrap_err();
    assert_eq!(unknown.status(), 404);

    store.upsert_instrument("MSFT", None, None).unwrap();
    let empty = store.current_quote("MSFT").unwrap_err();
    assert_eq!(empty.status(), 502);
}

#[test]
fn close_on_or_before_skips_gaps() {
    let store = seeded_store();
    assert_eq!(store.close_on_or_before("AAPL", date(2024, 3, 3)).unwrap(), Some((date(2024, 3, 1), 180.0)));
    assert_eq!(store.close_on_or_before("AAPL", date(2024, 2, 28)).unwrap(), None);
    assert_eq!(store.bar_count("AAPL").unwrap(), 3);
}

#[test]
fn reinserting_a_bar_replaces_it() {
    let store = seeded_store();
    store
        .insert_bar("AAPL", &PriceBar { date: date(2024, 3, 5), high: None, low: None, close: 190.0, volume: None })
        .unwrap();
    assert_eq!(store.bar_count("AAPL").unwrap(), 3);
    assert_eq!(store.current_quote("AAPL").unwrap().price, 190.0);
}

#[test]
fn import_json_loads_instruments_and_bars() {
    let store = PriceStore::in_memory().unwrap();
    store.migrate().unwrap();
    let written = store
        .import_json(
            r#"{"instruments":[
                {"ticker":"nvda","company_name":"NVIDIA","currency":"USD",
                 "bars":[{"date":"2024-01-02","close":480.0},{"date":"2024-01-03","close":475.5,"volume":42}]}
            ]}"#,
        )
        .unwrap();

    assert_eq!(written, 2);
    let quote = store.current_quote("NVDA").unwrap();
    assert_eq!(quote.price, 475.5);
    assert_eq!(quote.last_price, Some(480.0));
}

#[test]
fn sample_price_file_imports() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/sample_prices.json");
    let json = std::fs::read_to_string(path).expect("sample prices");
    let store = PriceStore::in_memory().unwrap();
    store.migrate().unwrap();

    assert!(store.import_json(&json).unwrap() > 0);
    for ticker in ["AAPL", "MSFT", "NVDA", "JPM"] {
        assert!(store.current_quote(ticker).is_ok(), "{ticker} should resolve");
    }
}

#[test]
fn lookup_stock_normalises_and_stamps_request_time() {
    let store = seeded_store();
    let quote = lookup_stock(&store, " aapl ").unwrap();
    assert_eq!(quote.ticker, "AAPL");
    assert!(quote.request_timestamp.is_some());

    let json = serde_json::to_value(&quote).unwrap();
    assert_eq!(json["price"], 185.25);
    assert!(json.get("request_timestamp").is_some());
}

#[test]
fn lookup_stock_requires_a_ticker() {
    let err = lookup_stock(&StaticQuotes::new(), "").unwrap_err();
    assert!(matches!(err, SimError::InvalidInput(_)), "got {err:?}");
    assert!(err.to_string().contains("Ticker symbol required"));
}

#[test]
fn bare_quote_serializes_only_required_fields() {
    let json = serde_json::to_value(StockQuote::new("AAPL", 123.45)).unwrap();
    assert_eq!(json, serde_json::json!({ "ticker": "AAPL", "price": 123.45 }));
}

struct FlakyQuotes {
    calls: AtomicUsize,
}

impl MarketDataProvider for FlakyQuotes {
    fn name(&self) -> &'static str { "flaky" }

    fn current_quote(&self, ticker: &str) -> SimResult<StockQuote> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            return Err(SimError::upstream(ticker, "timeout"));
        }
        Ok(StockQuote::new(ticker, 100.0 + n as f64))
    }
}

#[test]
fn memoized_quotes_cache_successes_only() {
    let memo = MemoizedQuotes::new(FlakyQuotes { calls: AtomicUsize::new(0) });

    assert!(memo.current_quote("AAPL").is_err(), "first call fails upstream");
    assert_eq!(memo.cached_len(), 0, "failures are not cached");

    let first = memo.current_quote("AAPL").unwrap();
    let second = memo.current_quote("AAPL").unwrap();
    assert_eq!(first, second, "second lookup served from cache");
    assert_eq!(memo.cached_len(), 1);

    memo.clear();
    assert_ne!(memo.current_quote("AAPL").unwrap(), first, "cleared cache refetches");
}

#[test]
fn resolve_quotes_keeps_ticker_order() {
    let market = StaticQuotes::new()
        .with_price("AAPL", 1.0)
        .with_price("MSFT", 2.0)
        .with_price("NVDA", 3.0);
    let tickers = ["NVDA".to_string(), "AAPL".to_string(), "MSFT".to_string()];

    let quotes = resolve_quotes(&market, &tickers).unwrap();
    let prices: Vec<f64> = quotes.iter().map(|q| q.price).collect();
    assert_eq!(prices, vec![3.0, 1.0, 2.0]);
}

#[test]
fn resolve_quotes_fails_on_any_missing_ticker() {
    let market = StaticQuotes::new().with_price("AAPL", 1.0).with_price("MSFT", 2.0);
    let tickers = ["AAPL".to_string(), "MISSING".to_string(), "MSFT".to_string()];

    match resolve_quotes(&market, &tickers) {
        Err(SimError::PriceUnavailable { ticker, .. }) => assert_eq!(ticker, "MISSING"),
        other => panic!("expected PriceUnavailable, got {other:?}"),
    }
}

#[test]
fn open_accepts_file_and_memory_databases() {
    let path = std::env::temp_dir().join(format!("autocall-{}.db", uuid::Uuid::new_v4()));
    let store = PriceStore::open(path.to_str().unwrap()).expect("file store opens in WAL mode");
    store.migrate().unwrap();
    store.upsert_instrument("AAPL", Some("Apple Inc."), Some("USD")).unwrap();
    assert!(store.instrument("AAPL").unwrap().is_some());
    drop(store);
    let _ = std::fs::remove_file(&path);

    let store = PriceStore::open(":memory:").expect("runner default opens");
    store.migrate().unwrap();
    assert_eq!(store.bar_count("AAPL").unwrap(), 0);
}
