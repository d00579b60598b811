//! Evolutionary search over schedule candidates.
//!
//! One [`EvolutionarySearch`] session owns its random stream, search space,
//! and visited set; the cost model and record database are immutable borrows
//! for the session's lifetime. Each call to [`search_bests`] or
//! [`search_eps_greedy`] runs the full generation pipeline to completion:
//!
//! 1. seed the population from the database's top records,
//! 2. top up with rule-pruned sketches,
//! 3. evolve: crossover pairs, mutate + score every candidate, keep the
//!    bounded best,
//! 4. select with the visited-set filter (eps-greedy mixes in fresh random
//!    sketches).
//!
//! With a fixed seed the output is fully determined by the task, the cost
//! model snapshot, the database snapshot, and the options.
//!
//! [`search_bests`]: EvolutionarySearch::search_bests
//! [`search_eps_greedy`]: EvolutionarySearch::search_eps_greedy

use kuzna_ir::{IrSchedule, RandomEngine};
use snafu::{ResultExt, ensure};

use crate::cost::CostModel;
use crate::database::Database;
use crate::error::*;
use crate::space::{SearchSpace, SketchStrategy};
use crate::state::{BoundedBestSet, SearchState, VisitedSet};
use crate::task::TuneTask;
use crate::tuning::TuningOptions;

/// Evolutionary auto-scheduler for one tuning task.
pub struct EvolutionarySearch<'a> {
    task: TuneTask,
    cost_model: &'a dyn CostModel,
    database: &'a dyn Database,
    rng: RandomEngine,
    search_space: SearchSpace,
    visited: VisitedSet,
}

impl<'a> EvolutionarySearch<'a> {
    /// Open a search session. The search space gets its own forked stream,
    /// so session-level draws (crossover pairing) and space-level draws
    /// (sketching, mutation) stay independent.
    pub fn new(task: TuneTask, cost_model: &'a dyn CostModel, database: &'a dyn Database, seed: u64) -> Self {
        let mut rng = RandomEngine::new(seed);
        let search_space = SearchSpace::new(task.clone(), rng.fork());
        Self { task, cost_model, database, rng, search_space, visited: VisitedSet::default() }
    }

    pub fn task(&self) -> &TuneTask {
        &self.task
    }

    /// Candidates returned so far in this session.
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Convenience: the single best unvisited candidate.
    pub fn search_one(&mut self, options: &TuningOptions) -> Result<SearchState> {
        self.search_bests(options)?.into_iter().next().ok_or(Error::EmptySearchResult)
    }

    /// The top candidates of one evolved generation, best first, filtered
    /// and recorded against the visited set.
    pub fn search_bests(&mut self, options: &TuningOptions) -> Result<Vec<SearchState>> {
        options.validate()?;
        let bests = self.evolve_generation(options)?;
        Ok(self.take_unvisited(bests, options.num_samples_per_iteration))
    }

    /// Eps-greedy selection: mostly evolved bests, a fraction of fresh
    /// random sketches, deduplicated against the session's visited set.
    pub fn search_eps_greedy(&mut self, options: &TuningOptions) -> Result<Vec<SearchState>> {
        options.validate()?;
        let bests = self.evolve_generation(options)?;
        let random_num = options.init_population_num - options.pick_database_topk;
        let rands = self.search_space.generate_sketches(random_num, SketchStrategy::RandomPrune);
        Ok(self.pick_next_generation_eps_greedy(
            &bests,
            &rands,
            options.num_samples_per_iteration,
            options.eps_greedy,
        ))
    }

    /// Steps 1-3 of the pipeline; does not touch the visited set.
    fn evolve_generation(&mut self, options: &TuningOptions) -> Result<Vec<SearchState>> {
        tracing::debug!(visited = self.visited.len(), task = self.task.key(), "starting generation");

        let db_seed = self.seed_from_database(options.pick_database_topk);
        tracing::debug!(count = db_seed.len(), "database seed");

        // A database handing back more than asked still only displaces
        // sketches, never underflows.
        let init_num = options.init_population_num.saturating_sub(db_seed.len());
        let mut population = db_seed;
        population.extend(self.search_space.generate_sketches(init_num, SketchStrategy::RulePrune));
        tracing::debug!(population = population.len(), "initial population assembled");

        Ok(self.evolve(&population, options.cross_over_num, options.num_samples_per_iteration))
    }

    /// Load up to `topk` records and replay them on fresh copies of the base
    /// module. Undecodable or unreplayable records are skipped.
    fn seed_from_database(&mut self, topk: usize) -> Vec<SearchState> {
        if topk == 0 {
            return Vec::new();
        }
        let records = self.database.top_k(self.task.key(), topk);
        let mut seeds = Vec::with_capacity(records.len());
        for record in records {
            let descriptor = match record.descriptor() {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(task = self.task.key(), error = %e, "skipping undecodable record");
                    continue;
                }
            };
            let mut schedule = IrSchedule::new(self.task.module().deep_copy(), self.rng.fork());
            if let Err(e) = descriptor.replay_on(&mut schedule) {
                tracing::warn!(task = self.task.key(), error = %e, "skipping unreplayable record");
                continue;
            }
            seeds.push(SearchState::with_cost(schedule, record.predicted_cost));
        }
        seeds
    }

    /// One generation: crossover children, then mutate + score everything
    /// and keep the `ret_num` best.
    pub(crate) fn evolve(&mut self, population: &[SearchState], cross_over_num: usize, ret_num: usize) -> Vec<SearchState> {
        tracing::debug!(population = population.len(), cross_over_num, ret_num, "evolve");
        if population.is_empty() {
            return Vec::new();
        }

        let mut generation: Vec<SearchState> = population.to_vec();
        if population.len() >= 2 {
            for _ in 0..cross_over_num {
                match self.crossover_random_pair(population) {
                    Ok(child) => generation.push(child),
                    Err(e) => tracing::debug!(error = %e, "crossover attempt skipped"),
                }
            }
        } else if cross_over_num > 0 {
            tracing::debug!("population too small for crossover; skipping");
        }

        let mut best = BoundedBestSet::new(ret_num);
        for state in &generation {
            best.push(self.search_space.get_schedule_mutate(state, self.cost_model));
        }
        best.into_sorted_vec()
    }

    fn crossover_random_pair(&mut self, population: &[SearchState]) -> Result<SearchState> {
        let n = population.len() as i64;
        let first = self.rng.sample_uniform_int(0, n).context(SamplingSnafu)?;
        let mut second = self.rng.sample_uniform_int(0, n).context(SamplingSnafu)?;
        while second == first {
            second = self.rng.sample_uniform_int(0, n).context(SamplingSnafu)?;
        }
        self.crossover(&population[first as usize], &population[second as usize])
    }

    /// Per-function random mixing of two parents. The child is unscored; the
    /// mutate step of [`Self::evolve`] scores it.
    pub(crate) fn crossover(&mut self, s1: &SearchState, s2: &SearchState) -> Result<SearchState> {
        let father = s1.schedule().module_exprs();
        let mother = s2.schedule().module_exprs();
        ensure!(
            father.len() == mother.len(),
            CrossoverArityMismatchSnafu { left: father.len(), right: mother.len() }
        );

        let mut child_exprs = Vec::with_capacity(father.len());
        for i in 0..father.len() {
            let from_father = self.rng.sample_uniform_int(0, 2).context(SamplingSnafu)? == 0;
            let parent = if from_father { &father[i] } else { &mother[i] };
            child_exprs.push(parent.clone());
        }
        Ok(SearchState::new(IrSchedule::from_exprs(child_exprs, self.rng.fork())))
    }

    /// Keep the first `limit` states not yet seen this session, recording
    /// them as visited.
    fn take_unvisited(&mut self, states: Vec<SearchState>, limit: usize) -> Vec<SearchState> {
        let mut result = Vec::new();
        let mut deduplicated = 0usize;
        for state in states {
            if result.len() == limit {
                break;
            }
            if self.visited.insert(&state) {
                result.push(state);
            } else {
                deduplicated += 1;
            }
        }
        if deduplicated > 0 {
            tracing::debug!(deduplicated, returned = result.len(), "visited-set dedup");
        }
        result
    }

    /// Interleave bests and random sketches into the returned generation.
    ///
    /// Fills `num - floor(num * eps)` slots from `bests` first, then random
    /// sketches, then backfills from the remaining bests; every selection is
    /// checked against the visited set.
    pub(crate) fn pick_next_generation_eps_greedy(
        &mut self,
        bests: &[SearchState],
        rands: &[SearchState],
        num: usize,
        eps_greedy: f64,
    ) -> Vec<SearchState> {
        let num_rands = (num as f64 * eps_greedy) as usize;
        let num_bests = num - num_rands;

        let mut result = Vec::new();
        let mut deduplicated = 0usize;
        let mut best_idx = 0;
        let mut rand_idx = 0;
        while result.len() < num {
            let selected = if result.len() < num_bests && best_idx < bests.len() {
                best_idx += 1;
                &bests[best_idx - 1]
            } else if rand_idx < rands.len() {
                rand_idx += 1;
                &rands[rand_idx - 1]
            } else if best_idx < bests.len() {
                best_idx += 1;
                &bests[best_idx - 1]
            } else {
                break;
            };

            if self.visited.insert(selected) {
                result.push(selected.clone());
            } else {
                deduplicated += 1;
            }
        }

        tracing::debug!(
            bests = bests.len(),
            rands = rands.len(),
            num,
            eps_greedy,
            deduplicated,
            returned = result.len(),
            "eps-greedy selection"
        );
        result
    }
}
