//! SQLite price store.
//!
//! RULE: Only store.rs talks to the database.
//! The market-data provider and the historical replay model call store
//! methods; they never execute SQL directly.
//!
//! Simulation results are never written here.

use crate::{
    error::{SimError, SimResult},
    market_data::{MarketDataProvider, StockQuote},
    types::Ticker,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One daily bar of an instrument's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date:   NaiveDate,
    #[serde(default)]
    pub high:   Option<f64>,
    #[serde(default)]
    pub low:    Option<f64>,
    pub close:  f64,
    #[serde(default)]
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentRow {
    pub ticker:       Ticker,
    pub company_name: Option<String>,
    pub currency:     Option<String>,
}

/// On-disk format accepted by `import_json`.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceHistoryFile {
    pub instruments: Vec<InstrumentHistory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentHistory {
    pub ticker:       Ticker,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub currency:     Option<String>,
    pub bars:         Vec<PriceBar>,
}

pub struct PriceStore {
    conn: Mutex<Connection>,
}

impl PriceStore {
    /// Open (or create) the price database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // :memory: answers "memory" and stays in memory mode.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn()?
            .execute_batch(include_str!("../../migrations/001_prices.sql"))?;
        Ok(())
    }

    fn conn(&self) -> SimResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SimError::InternalComputation("price store lock poisoned".into()))
    }

    // ── Instrument ─────────────────────────────────────────────

    pub fn upsert_instrument(
        &self,
        ticker: &str,
        company_name: Option<&str>,
        currency: Option<&str>,
    ) -> SimResult<()> {
        self.conn()?.execute(
            "INSERT INTO instrument (ticker, company_name, currency) VALUES (?1, ?2, ?3)
             ON CONFLICT(ticker) DO UPDATE SET company_name = excluded.company_name,
                                               currency     = excluded.currency",
            params![ticker, company_name, currency],
        )?;
        Ok(())
    }

    pub fn instrument(&self, ticker: &str) -> SimResult<Option<InstrumentRow>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT ticker, company_name, currency FROM instrument WHERE ticker = ?1",
                params![ticker],
                |row| {
                    Ok(InstrumentRow {
                        ticker:       row.get(0)?,
                        company_name: row.get(1)?,
                        currency:     row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ── Price bars ─────────────────────────────────────────────

    /// Insert a bar, replacing any existing bar for the same date.
    pub fn insert_bar(&self, ticker: &str, bar: &PriceBar) -> SimResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO price_bar (ticker, bar_date, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ticker,
                bar.date.format(DATE_FORMAT).to_string(),
                bar.high,
                bar.low,
                bar.close,
                bar.volume.map(|v| v as i64),
            ],
        )?;
        Ok(())
    }

    /// Most recent bars, newest first.
    pub fn latest_bars(&self, ticker: &str, limit: usize) -> SimResult<Vec<PriceBar>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT bar_date, high, low, close, volume FROM price_bar
             WHERE ticker = ?1 ORDER BY bar_date DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![ticker, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?;

        let mut bars = Vec::new();
        for row in rows {
            let (date, high, low, close, volume) = row?;
            bars.push(PriceBar {
                date: parse_date(&date)?,
                high,
                low,
                close,
                volume: volume.map(|v| v.max(0) as u64),
            });
        }
        Ok(bars)
    }

    /// Close of the last bar dated on or before `date`.
    pub fn close_on_or_before(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> SimResult<Option<(NaiveDate, f64)>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT bar_date, close FROM price_bar
                 WHERE ticker = ?1 AND bar_date <= ?2
                 ORDER BY bar_date DESC LIMIT 1",
                params![ticker, date.format(DATE_FORMAT).to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;

        row.map(|(d, close)| parse_date(&d).map(|date| (date, close)))
            .transpose()
    }

    pub fn bar_count(&self, ticker: &str) -> SimResult<i64> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM price_bar WHERE ticker = ?1",
            params![ticker],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Import ─────────────────────────────────────────────────

    /// Load a price history file. Returns the number of bars written.
    pub fn import_json(&self, json: &str) -> SimResult<usize> {
        let file: PriceHistoryFile = serde_json::from_str(json)?;
        let mut written = 0;
        for history in &file.instruments {
            let ticker = history.ticker.trim().to_ascii_uppercase();
            self.upsert_instrument(
                &ticker,
                history.company_name.as_deref(),
                history.currency.as_deref(),
            )?;
            for bar in &history.bars {
                self.insert_bar(&ticker, bar)?;
                written += 1;
            }
            log::debug!("imported {} bars for {ticker}", history.bars.len());
        }
        Ok(written)
    }
}

impl MarketDataProvider for PriceStore {
    fn name(&self) -> &'static str { "price_store" }

    /// Latest bar becomes the quote; the bar before it supplies `last_price`.
    fn current_quote(&self, ticker: &str) -> SimResult<StockQuote> {
        let instrument = self
            .instrument(ticker)?
            .ok_or_else(|| SimError::unknown_ticker(ticker))?;

        let bars = self.latest_bars(ticker, 2)?;
        let latest = bars
            .first()
            .ok_or_else(|| SimError::upstream(ticker, "no price history"))?;

        Ok(StockQuote {
            ticker:            instrument.ticker,
            price:             latest.close,
            company_name:      instrument.company_name,
            currency:          instrument.currency,
            data_timestamp:    Some(latest.date.format(DATE_FORMAT).to_string()),
            day_high:          latest.high,
            day_low:           latest.low,
            last_price:        bars.get(1).map(|b| b.close),
            request_timestamp: None,
            volume:            latest.volume,
        })
    }
}

fn parse_date(raw: &str) -> SimResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| SimError::InternalComputation(format!("bad bar_date '{raw}' in store: {e}")))
}
