//! Mutation rules.
//!
//! A mutation rule perturbs an existing schedule descriptor without touching
//! IR: it rewrites steps in a cloned trace, and the caller replays the result
//! onto a fresh copy of the base module. A rule that finds nothing to perturb
//! rejects with [`crate::error::Error::RuleRejected`] and the caller falls
//! back to re-scoring the unmutated input.

pub mod tile_size;
pub mod unroll_step;

pub use tile_size::MutateTileSize;
pub use unroll_step::MutateUnrollStep;

use kuzna_ir::{RandomEngine, ScheduleDescriptor};
use once_cell::sync::Lazy;

use crate::error::Result;

/// A trace-perturbation strategy.
///
/// Stateless like the sketch rules; the caller supplies the random stream.
pub trait MutateRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Relative integer weight in the rule-selection draw.
    fn weight(&self) -> u32 {
        1
    }

    /// Produce a mutated trace, or reject.
    fn apply(&self, trace: &ScheduleDescriptor, rng: &mut RandomEngine) -> Result<ScheduleDescriptor>;
}

/// The stock mutation table.
pub(crate) static MUTATE_RULES: Lazy<Vec<Box<dyn MutateRule>>> =
    Lazy::new(|| vec![Box::new(MutateTileSize), Box::new(MutateUnrollStep)]);
