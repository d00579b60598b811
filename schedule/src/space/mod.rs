//! The per-task search space: rule catalogs, sketch generation, and the
//! schedule-then-mutate step.

pub mod mutate;
pub mod sketch;

use std::fmt;
use std::str::FromStr;

use kuzna_ir::{IrSchedule, RandomEngine};
use snafu::ResultExt;

use crate::cost::{CostModel, sanitize_cost};
use crate::error::*;
use crate::state::SearchState;
use crate::task::TuneTask;
use mutate::MutateRule;
use sketch::{RuleApply, SketchRule};

/// How sketch generation walks the rule pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SketchStrategy {
    /// Expand every applicable branch of every rule, honoring rules that
    /// prune the remaining pipeline. Deterministic breadth-first coverage.
    RulePrune,
    /// Take one uniformly random applicable branch per rule per sketch.
    /// Used for exploration.
    RandomPrune,
}

impl FromStr for SketchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rule_prune" => Ok(Self::RulePrune),
            "random_prune" => Ok(Self::RandomPrune),
            other => UnknownStrategySnafu { name: other }.fail(),
        }
    }
}

impl fmt::Display for SketchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RulePrune => write!(f, "rule_prune"),
            Self::RandomPrune => write!(f, "random_prune"),
        }
    }
}

/// All positive divisors of `n`, ascending.
pub(crate) fn divisors(n: i64) -> Vec<i64> {
    (1..=n).filter(|d| n % d == 0).collect()
}

/// Candidate unroll depths, shared by the sketch-side annotation rule and
/// its mutation counterpart.
pub(crate) const AUTO_UNROLL_STEPS: [i64; 4] = [0, 16, 64, 512];

/// Holds the rule catalogs for one task and produces candidates from them.
pub struct SearchSpace {
    task: TuneTask,
    rng: RandomEngine,
    sketch_rules: &'static [Box<dyn SketchRule>],
    mutate_rules: &'static [Box<dyn MutateRule>],
}

impl SearchSpace {
    /// Search space over the stock rule catalogs.
    pub fn new(task: TuneTask, rng: RandomEngine) -> Self {
        Self { task, rng, sketch_rules: sketch::SKETCH_RULES.as_slice(), mutate_rules: mutate::MUTATE_RULES.as_slice() }
    }

    pub fn task(&self) -> &TuneTask {
        &self.task
    }

    /// A fresh unscheduled copy of the base module.
    fn fresh_schedule(&mut self) -> IrSchedule {
        IrSchedule::new(self.task.module().deep_copy(), self.rng.fork())
    }

    /// Generate up to `n` sketches from scratch.
    ///
    /// Returns exactly `n` when the space allows; fewer on exhaustion, which
    /// the caller tolerates.
    pub fn generate_sketches(&mut self, n: usize, strategy: SketchStrategy) -> Vec<SearchState> {
        if n == 0 {
            return Vec::new();
        }
        let sketches = match strategy {
            SketchStrategy::RulePrune => self.sketch_rule_prune(n),
            SketchStrategy::RandomPrune => self.sketch_random_prune(n),
        };
        if sketches.len() < n {
            tracing::debug!(requested = n, produced = sketches.len(), %strategy, "sketch space exhausted");
        }
        sketches
    }

    fn sketch_rule_prune(&mut self, n: usize) -> Vec<SearchState> {
        let cap = n.saturating_mul(4).max(8);
        let mut frontier = vec![(self.fresh_schedule(), false)];
        for rule in self.sketch_rules {
            let mut next: Vec<(IrSchedule, bool)> = Vec::new();
            for (mut sch, pruned) in frontier {
                if pruned {
                    next.push((sch, true));
                    continue;
                }
                let branches = rule.num_applicable(&sch, &self.task);
                if branches == 0 {
                    next.push((sch, false));
                    continue;
                }
                for branch in 0..branches {
                    if next.len() >= cap {
                        break;
                    }
                    let mut child = sch.deep_copy();
                    match rule.apply(&mut child, branch, &self.task) {
                        Ok(RuleApply::Apply) => next.push((child, false)),
                        Ok(RuleApply::ApplyAndPrune) => next.push((child, true)),
                        Err(e) => {
                            tracing::debug!(rule = rule.name(), branch, error = %e, "sketch branch rejected");
                        }
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        frontier.into_iter().take(n).map(|(sch, _)| SearchState::new(sch)).collect()
    }

    fn sketch_random_prune(&mut self, n: usize) -> Vec<SearchState> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let mut sch = self.fresh_schedule();
            for rule in self.sketch_rules {
                let branches = rule.num_applicable(&sch, &self.task);
                if branches == 0 {
                    continue;
                }
                let branch =
                    sch.rng_mut().sample_uniform_int(0, branches as i64).map(|v| v as usize).unwrap_or(0);
                match rule.apply(&mut sch, branch, &self.task) {
                    Ok(RuleApply::Apply) => {}
                    Ok(RuleApply::ApplyAndPrune) => break,
                    Err(e) => tracing::debug!(rule = rule.name(), branch, error = %e, "random branch rejected"),
                }
            }
            out.push(SearchState::new(sch));
        }
        out
    }

    /// Mutate a candidate's trace and score the result.
    ///
    /// Always returns a scored state: if the drawn rule rejects the input,
    /// the mutated trace fails to replay, or the trace has nothing to
    /// mutate, the input itself is re-scored instead.
    pub fn get_schedule_mutate(&mut self, state: &SearchState, cost_model: &dyn CostModel) -> SearchState {
        match self.try_mutate(state) {
            Ok(mutated) => {
                let cost = sanitize_cost(cost_model.predict(&mutated));
                SearchState::with_cost(mutated, cost)
            }
            Err(e) => {
                tracing::debug!(error = %e, "mutation fell back to re-scoring the input");
                state.rescored(sanitize_cost(cost_model.predict(state.schedule())))
            }
        }
    }

    fn try_mutate(&mut self, state: &SearchState) -> Result<IrSchedule> {
        let total: u32 = self.mutate_rules.iter().map(|r| r.weight()).sum();
        let mut ticket = self.rng.sample_uniform_int(0, total as i64).context(SamplingSnafu)? as u32;
        let mut selected: &dyn MutateRule = self.mutate_rules[0].as_ref();
        for rule in self.mutate_rules {
            if ticket < rule.weight() {
                selected = rule.as_ref();
                break;
            }
            ticket -= rule.weight();
        }
        tracing::debug!(rule = selected.name(), "mutation rule drawn");

        let mutated_trace = selected.apply(state.schedule().trace(), &mut self.rng)?;
        let mut fresh = IrSchedule::new(self.task.module().deep_copy(), self.rng.fork());
        mutated_trace.replay_on(&mut fresh).context(ReplayFailedSnafu)?;
        Ok(fresh)
    }
}
