//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulator may call any platform RNG.
//! All randomness flows through PathRng instances derived from the
//! master seed in the path model configuration.
//!
//! Each stream is seeded from (master_seed XOR stream * golden-ratio),
//! so a given (seed, stream) pair always yields the same draws.

use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64Mcg;

/// Stable stream assignments. Append only: reordering changes every
/// stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngStream {
    PricePath = 0,
}

pub struct PathRng {
    inner: Pcg64Mcg,
}

impl PathRng {
    pub fn new(master_seed: u64, stream: RngStream) -> Self {
        let derived_seed = master_seed ^ ((stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Draw from N(0, 1).
    pub fn standard_normal(&mut self) -> f64 {
        self.inner.sample(StandardNormal)
    }
}
