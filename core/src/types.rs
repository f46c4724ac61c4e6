//! Shared primitive types used across the entire simulator.

/// A ticker symbol, normalised to upper case.
pub type Ticker = String;

/// Opaque identifier of one simulation run (UUID v4 string).
pub type SimulationId = String;

/// 1-based index of a quarterly observation date.
pub type Quarter = u32;

/// Number of underlyings a worst-of note is written on.
pub const UNDERLYING_COUNT: usize = 3;
