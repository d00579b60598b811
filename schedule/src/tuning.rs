//! Tuning configuration for an evolutionary search session.

use bon::bon;
use snafu::ensure;

use crate::error::*;

/// Options recognized by one `search_bests` / `search_eps_greedy` call.
///
/// Invariants are checked by [`TuningOptions::validate`] before a call
/// touches any session state:
///
/// - `init_population_num >= 1`
/// - `pick_database_topk <= init_population_num`
/// - `num_samples_per_iteration >= 1`
/// - `eps_greedy` in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOptions {
    /// Size of the initial population, database picks included.
    pub init_population_num: usize,
    /// How many top records to pull from the database.
    pub pick_database_topk: usize,
    /// Crossover children produced per generation.
    pub cross_over_num: usize,
    /// Candidates ultimately returned per call.
    pub num_samples_per_iteration: usize,
    /// Fraction of returned candidates drawn from fresh random sketches.
    pub eps_greedy: f64,
}

impl Default for TuningOptions {
    fn default() -> Self {
        Self {
            init_population_num: 10,
            pick_database_topk: 2,
            cross_over_num: 4,
            num_samples_per_iteration: 10,
            eps_greedy: 0.05,
        }
    }
}

#[bon]
impl TuningOptions {
    /// Create tuning options with builder pattern.
    #[builder]
    pub fn new(
        #[builder(default = 10)] init_population_num: usize,
        #[builder(default = 2)] pick_database_topk: usize,
        #[builder(default = 4)] cross_over_num: usize,
        #[builder(default = 10)] num_samples_per_iteration: usize,
        #[builder(default = 0.05)] eps_greedy: f64,
    ) -> Self {
        Self { init_population_num, pick_database_topk, cross_over_num, num_samples_per_iteration, eps_greedy }
    }
}

impl TuningOptions {
    /// Check the option invariants.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.init_population_num >= 1, EmptyPopulationSnafu);
        ensure!(
            self.pick_database_topk <= self.init_population_num,
            TopkExceedsPopulationSnafu { topk: self.pick_database_topk, population: self.init_population_num }
        );
        ensure!(self.num_samples_per_iteration >= 1, NoSamplesRequestedSnafu);
        ensure!(
            (0.0..=1.0).contains(&self.eps_greedy),
            EpsGreedyOutOfRangeSnafu { value: self.eps_greedy }
        );
        Ok(())
    }
}
