//! Resample the factors of one split step.

use kuzna_ir::{RandomEngine, ScheduleDescriptor, Step};
use snafu::ResultExt;

use super::MutateRule;
use crate::error::*;
use crate::space::divisors;

/// Picks one `split` step of the trace and redraws a factor pair while
/// preserving the pair's product, so the mutated trace still replays on the
/// same loop extent.
pub struct MutateTileSize;

impl MutateRule for MutateTileSize {
    fn name(&self) -> &'static str {
        "mutate_tile_size"
    }

    fn weight(&self) -> u32 {
        2
    }

    fn apply(&self, trace: &ScheduleDescriptor, rng: &mut RandomEngine) -> Result<ScheduleDescriptor> {
        let split_positions: Vec<usize> = trace
            .steps()
            .iter()
            .enumerate()
            .filter_map(|(i, step)| match step {
                Step::Split { factors, .. } if factors.len() >= 2 => Some(i),
                _ => None,
            })
            .collect();
        if split_positions.is_empty() {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        }

        let pick = rng.sample_uniform_int(0, split_positions.len() as i64).context(SamplingSnafu)?;
        let target = split_positions[pick as usize];

        let mut steps: Vec<Step> = trace.steps().to_vec();
        let Step::Split { factors, .. } = &mut steps[target] else {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        };

        let slot = rng.sample_uniform_int(0, factors.len() as i64 - 1).context(SamplingSnafu)? as usize;
        let product = factors[slot] * factors[slot + 1];
        let options: Vec<i64> = divisors(product).into_iter().filter(|&d| d != factors[slot + 1]).collect();
        if options.is_empty() {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        }

        let inner = options[rng.sample_uniform_int(0, options.len() as i64).context(SamplingSnafu)? as usize];
        factors[slot] = product / inner;
        factors[slot + 1] = inner;

        Ok(ScheduleDescriptor::new(steps))
    }
}

#[cfg(test)]
mod tests {
    use kuzna_ir::{FuncExpr, IrSchedule, Module, RandomEngine};

    use super::*;

    fn traced() -> ScheduleDescriptor {
        let module = Module::new(vec![FuncExpr::loop_nest("f", &[("i", 64), ("j", 64)], "C")]);
        let mut sch = IrSchedule::new(module, RandomEngine::new(1));
        sch.split("i", &[16, 4]).unwrap();
        sch.parallel("i.0").unwrap();
        sch.trace().clone()
    }

    #[test]
    fn test_preserves_split_product() {
        let trace = traced();
        let mut rng = RandomEngine::new(42);
        let mutated = MutateTileSize.apply(&trace, &mut rng).unwrap();

        let Step::Split { factors, .. } = &mutated.steps()[0] else {
            panic!("first step should stay a split");
        };
        assert_eq!(factors.iter().product::<i64>(), 64);
        assert_ne!(factors.as_slice(), &[16, 4]);
        // Non-split steps are untouched.
        assert_eq!(mutated.steps()[1], trace.steps()[1]);
    }

    #[test]
    fn test_mutated_trace_replays() {
        let trace = traced();
        let mut rng = RandomEngine::new(7);
        let mutated = MutateTileSize.apply(&trace, &mut rng).unwrap();

        let module = Module::new(vec![FuncExpr::loop_nest("f", &[("i", 64), ("j", 64)], "C")]);
        let mut fresh = IrSchedule::new(module, RandomEngine::new(2));
        mutated.replay_on(&mut fresh).unwrap();
    }

    #[test]
    fn test_rejects_trace_without_splits() {
        let trace = ScheduleDescriptor::new(vec![Step::Parallel { loop_id: "i".to_owned() }]);
        let mut rng = RandomEngine::new(3);
        assert!(matches!(MutateTileSize.apply(&trace, &mut rng), Err(Error::RuleRejected { .. })));
    }

    #[test]
    fn test_rejects_empty_trace() {
        let mut rng = RandomEngine::new(3);
        assert!(matches!(
            MutateTileSize.apply(&ScheduleDescriptor::default(), &mut rng),
            Err(Error::RuleRejected { .. })
        ));
    }
}
