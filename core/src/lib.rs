//! Worst-of autocall note simulator.
//!
//! The engine is a pure function of (quotes, price path, terms). Quotes
//! come from a MarketDataProvider, prices at each observation from a
//! PricePathProvider; both are swappable.

pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod outcome;
pub mod path;
pub mod rng;
pub mod schedule;
pub mod store;
pub mod terms;
pub mod types;
