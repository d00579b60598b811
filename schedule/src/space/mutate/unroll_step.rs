//! Redraw an unroll-depth annotation.

use kuzna_ir::{RandomEngine, ScheduleDescriptor, Step};
use snafu::ResultExt;

use super::MutateRule;
use crate::error::*;
use crate::space::AUTO_UNROLL_STEPS;

/// Picks one `annotate_unroll` step and redraws its max step from the
/// candidate set, excluding the current value.
pub struct MutateUnrollStep;

impl MutateRule for MutateUnrollStep {
    fn name(&self) -> &'static str {
        "mutate_unroll_step"
    }

    fn apply(&self, trace: &ScheduleDescriptor, rng: &mut RandomEngine) -> Result<ScheduleDescriptor> {
        let positions: Vec<usize> = trace
            .steps()
            .iter()
            .enumerate()
            .filter_map(|(i, step)| matches!(step, Step::AnnotateUnroll { .. }).then_some(i))
            .collect();
        if positions.is_empty() {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        }

        let pick = rng.sample_uniform_int(0, positions.len() as i64).context(SamplingSnafu)?;
        let target = positions[pick as usize];

        let mut steps: Vec<Step> = trace.steps().to_vec();
        let Step::AnnotateUnroll { max_step, .. } = &mut steps[target] else {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        };

        let options: Vec<i64> = AUTO_UNROLL_STEPS.iter().copied().filter(|s| s != max_step).collect();
        let choice = options[rng.sample_uniform_int(0, options.len() as i64).context(SamplingSnafu)? as usize];
        *max_step = choice;

        Ok(ScheduleDescriptor::new(steps))
    }
}
