//! Deterministic linear-congruential random engine.
//!
//! Every stochastic decision in the auto-scheduler flows through this engine
//! so that a search session is fully reproducible from its initial seed. The
//! engine is intentionally not a statistical-quality generator; the contract
//! is bit-identical output across platforms for the same seed and call
//! sequence.

use snafu::ensure;

use crate::error::{EmptySampleRangeSnafu, Result};

/// Knuth's MMIX multiplier.
const MULTIPLIER: u64 = 6364136223846793005;
/// Knuth's MMIX increment.
const INCREMENT: u64 = 1442695040888963407;
/// Replacement state for the degenerate zero seed.
const ZERO_SEED_REPLACEMENT: u64 = 0x2545F4914F6CDD1D;

/// Deterministic 64-bit linear-congruential stream.
///
/// Supports uniform integer sampling and forking. A fork seeds the child from
/// the parent's next output and advances the parent exactly once, so sibling
/// forks are distinct and the parent stream stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomEngine {
    state: u64,
}

impl RandomEngine {
    /// Create an engine from a seed. A zero seed is mapped to a fixed
    /// nonzero constant so the stream never degenerates.
    pub fn new(seed: u64) -> Self {
        Self { state: normalize_state(seed) }
    }

    /// Current raw state. Exposed so owners can persist and restore streams.
    pub fn state(&self) -> u64 {
        self.state
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        self.state
    }

    /// Sample uniformly from the half-open interval `[lo, hi)`.
    ///
    /// # Errors
    ///
    /// Returns `EmptySampleRange` when `hi <= lo`.
    pub fn sample_uniform_int(&mut self, lo: i64, hi: i64) -> Result<i64> {
        ensure!(lo < hi, EmptySampleRangeSnafu { lo, hi });
        let span = (hi as i128 - lo as i128) as u64;
        Ok(lo.wrapping_add((self.next_u64() % span) as i64))
    }

    /// Fork an independent child stream.
    ///
    /// The child is seeded from the parent's next output; the parent advances
    /// exactly once. Forking twice therefore produces two distinct streams.
    pub fn fork(&mut self) -> RandomEngine {
        RandomEngine { state: normalize_state(self.next_u64()) }
    }
}

fn normalize_state(seed: u64) -> u64 {
    if seed == 0 { ZERO_SEED_REPLACEMENT } else { seed }
}
