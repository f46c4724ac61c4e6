//! Simulator configuration.
//!
//! Loaded from a single JSON file. Every field has a default, so a
//! partial file only overrides what it names. In tests, use
//! SimConfig::default_test().

use crate::types::Quarter;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub product:    ProductConfig,
    pub path_model: PathModelConfig,
}

/// Observation structure of the note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductConfig {
    /// Total number of quarterly observations (3 years = 12).
    pub observations:           Quarter,
    /// Calendar months between two observations.
    pub months_per_observation: u32,
    /// Observations at which the note may autocall.
    pub autocall_quarters:      Vec<Quarter>,
    /// Worst-of ratio at or above which an eligible observation autocalls.
    pub autocall_trigger:       f64,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            observations:           12,
            months_per_observation: 3,
            autocall_quarters:      vec![4, 8, 12],
            autocall_trigger:       1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathModelKind {
    Gbm,
    Historical,
}

/// Parameters of the price-path provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathModelConfig {
    pub kind:        PathModelKind,
    /// Annualised drift (GBM only).
    pub drift:       f64,
    /// Annualised volatility (GBM only).
    pub volatility:  f64,
    /// Pairwise correlation between underlyings (GBM only).
    pub correlation: f64,
    pub seed:        u64,
    /// Date the historical replay measures returns from.
    pub replay_anchor: Option<NaiveDate>,
}

impl Default for PathModelConfig {
    fn default() -> Self {
        Self {
            kind:          PathModelKind::Gbm,
            drift:         0.03,
            volatility:    0.25,
            correlation:   0.5,
            seed:          42,
            replay_anchor: None,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            product:    ProductConfig::default(),
            path_model: PathModelConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load from a JSON file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SimConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            product: ProductConfig::default(),
            path_model: PathModelConfig {
                kind:          PathModelKind::Gbm,
                drift:         0.0,
                volatility:    0.20,
                correlation:   0.3,
                seed:          7,
                replay_anchor: None,
            },
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.product;
        if p.observations == 0 {
            anyhow::bail!("product.observations must be > 0");
        }
        if p.months_per_observation == 0 {
            anyhow::bail!("product.months_per_observation must be > 0");
        }
        if let Some(q) = p.autocall_quarters.iter().find(|q| **q == 0 || **q > p.observations) {
            anyhow::bail!("product.autocall_quarters contains {q}, outside 1..={}", p.observations);
        }
        // Barriers never exceed 1.0, so a trigger of at least 1.0 keeps
        // every autocall quarter a coupon quarter.
        if !(p.autocall_trigger.is_finite() && p.autocall_trigger >= 1.0) {
            anyhow::bail!("product.autocall_trigger must be at least 1.0");
        }

        let m = &self.path_model;
        if !(m.volatility.is_finite() && m.volatility >= 0.0) {
            anyhow::bail!("path_model.volatility must be >= 0");
        }
        if !m.drift.is_finite() {
            anyhow::bail!("path_model.drift must be finite");
        }
        // Equicorrelated 3x3 matrix is PSD iff rho in [-1/2, 1].
        if !(-0.5..=1.0).contains(&m.correlation) {
            anyhow::bail!("path_model.correlation must be within [-0.5, 1.0]");
        }
        Ok(())
    }
}
