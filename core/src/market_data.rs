//! Market-data collaborator boundary.
//!
//! RULE: The simulator never fetches prices itself. Everything it
//! knows about "today's price" comes through a MarketDataProvider.
//! Retry policy, if any, belongs to the provider.

use crate::{
    error::{SimError, SimResult},
    terms::normalise_ticker,
    types::Ticker,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{mpsc, Mutex, PoisonError};

/// A point-in-time quote. Field names match the `stock` response body;
/// only `ticker` and `price` are guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockQuote {
    pub ticker: Ticker,
    pub price:  f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl StockQuote {
    /// A bare quote carrying only the required fields.
    pub fn new(ticker: &str, price: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            price,
            company_name: None,
            currency: None,
            data_timestamp: None,
            day_high: None,
            day_low: None,
            last_price: None,
            request_timestamp: None,
            volume: None,
        }
    }
}

/// The contract every source of current prices must fulfill.
pub trait MarketDataProvider: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Current quote for an already-normalised ticker.
    fn current_quote(&self, ticker: &str) -> SimResult<StockQuote>;
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for &P {
    fn name(&self) -> &'static str { (**self).name() }

    fn current_quote(&self, ticker: &str) -> SimResult<StockQuote> {
        (**self).current_quote(ticker)
    }
}

// ── Static quotes ──────────────────────────────────────────────

/// Fixed in-memory quote table. Used by tests and what-if runs.
#[derive(Debug, Clone, Default)]
pub struct StaticQuotes {
    quotes: HashMap<Ticker, StockQuote>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, ticker: &str, price: f64) -> Self {
        self.insert(StockQuote::new(ticker, price));
        self
    }

    pub fn insert(&mut self, quote: StockQuote) {
        self.quotes.insert(quote.ticker.to_ascii_uppercase(), quote);
    }
}

impl MarketDataProvider for StaticQuotes {
    fn name(&self) -> &'static str { "static" }

    fn current_quote(&self, ticker: &str) -> SimResult<StockQuote> {
        self.quotes
            .get(ticker)
            .cloned()
            .ok_or_else(|| SimError::unknown_ticker(ticker))
    }
}

// ── Memoized quotes ────────────────────────────────────────────

/// Caches successful quotes per ticker in front of another provider.
/// Failures are never cached.
pub struct MemoizedQuotes<P> {
    inner: P,
    cache: Mutex<HashMap<Ticker, StockQuote>>,
}

impl<P: MarketDataProvider> MemoizedQuotes<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl<P: MarketDataProvider> MarketDataProvider for MemoizedQuotes<P> {
    fn name(&self) -> &'static str { "memoized" }

    fn current_quote(&self, ticker: &str) -> SimResult<StockQuote> {
        if let Some(hit) = self.cache.lock().map_err(poisoned)?.get(ticker) {
            log::debug!("quote cache hit for {ticker}");
            return Ok(hit.clone());
        }

        // Lock is not held across the upstream call.
        let quote = self.inner.current_quote(ticker)?;
        self.cache
            .lock()
            .map_err(poisoned)?
            .insert(ticker.to_string(), quote.clone());
        Ok(quote)
    }
}

// ── Operations ─────────────────────────────────────────────────

/// Single-ticker quote lookup behind the `stock` operation.
pub fn lookup_stock<P: MarketDataProvider + ?Sized>(provider: &P, raw_ticker: &str) -> SimResult<StockQuote> {
    let ticker = normalise_ticker(raw_ticker)?;
    let mut quote = provider.current_quote(&ticker)?;
    quote.request_timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    Ok(quote)
}

/// Resolve all tickers concurrently, one thread per ticker.
///
/// Returns quotes in ticker order, or the first failure received.
/// Every quote is checked for a usable (positive, finite) price.
pub fn resolve_quotes<P: MarketDataProvider + ?Sized>(
    provider: &P,
    tickers: &[Ticker],
) -> SimResult<Vec<StockQuote>> {
    let (tx, rx) = mpsc::channel();

    std::thread::scope(|scope| {
        for (slot, ticker) in tickers.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                let result = provider
                    .current_quote(ticker)
                    .and_then(|quote| usable_quote(ticker, quote));
                // Receiver is gone only if another lookup already failed.
                let _ = tx.send((slot, result));
            });
        }
        drop(tx);

        let mut resolved: Vec<Option<StockQuote>> = vec![None; tickers.len()];
        for (slot, result) in rx.iter() {
            match result {
                Ok(quote) => resolved[slot] = Some(quote),
                Err(e) => {
                    log::warn!("{} lookup failed: {e}", provider.name());
                    return Err(e);
                }
            }
        }

        resolved
            .into_iter()
            .zip(tickers)
            .map(|(quote, ticker)| {
                quote.ok_or_else(|| SimError::upstream(ticker, "lookup produced no result"))
            })
            .collect()
    })
}

fn poisoned<T>(_: PoisonError<T>) -> SimError {
    SimError::InternalComputation("quote cache lock poisoned".into())
}

fn usable_quote(ticker: &str, quote: StockQuote) -> SimResult<StockQuote> {
    if !(quote.price.is_finite() && quote.price > 0.0) {
        return Err(SimError::upstream(
            ticker,
            format!("quoted price {} is not a positive number", quote.price),
        ));
    }
    Ok(quote)
}
