//! Tile loop nests for locality.

use kuzna_ir::{ExprNode, FuncExpr, IrSchedule, LoopKind};
use snafu::ResultExt;

use super::{RuleApply, SketchRule};
use crate::error::*;
use crate::space::divisors;
use crate::task::TuneTask;

/// Splits the leading serial loops of a function into tiles, with tile sizes
/// drawn from the schedule's own random stream. Branches enumerate
/// `variants` tilings per function that still has something worth tiling, so
/// one base module fans out into several tiled sketches.
pub struct MultiLevelTiling {
    /// Smallest extent worth tiling.
    pub min_extent: i64,
    /// Largest inner tile considered.
    pub max_factor: i64,
    /// How many loops per function to tile.
    pub max_tiled_loops: usize,
    /// Distinct tilings offered per function.
    pub variants: usize,
}

impl Default for MultiLevelTiling {
    fn default() -> Self {
        Self { min_extent: 4, max_factor: 64, max_tiled_loops: 3, variants: 4 }
    }
}

impl MultiLevelTiling {
    /// Inner tile sizes considered for a loop extent: proper divisors within
    /// `[2, max_factor]`.
    fn tile_options(&self, extent: i64) -> Vec<i64> {
        divisors(extent).into_iter().filter(|&d| d >= 2 && d <= self.max_factor && d < extent).collect()
    }

    /// Leading tilable loops of a function, outermost first.
    fn tilable_loops(&self, func: &FuncExpr) -> Vec<(String, i64)> {
        func.loops()
            .into_iter()
            .filter_map(|r| match func.node(r) {
                ExprNode::Loop { var, extent, kind: LoopKind::Serial, .. }
                    if *extent >= self.min_extent && !self.tile_options(*extent).is_empty() =>
                {
                    Some((var.clone(), *extent))
                }
                _ => None,
            })
            .take(self.max_tiled_loops)
            .collect()
    }

    fn has_significant_compute(func: &FuncExpr) -> bool {
        func.computes()
            .into_iter()
            .any(|r| matches!(func.node(r), ExprNode::Compute { trivial: false, inlined: false, .. }))
    }

    fn candidate_funcs(&self, schedule: &IrSchedule) -> Vec<String> {
        schedule
            .module_exprs()
            .iter()
            .filter(|f| Self::has_significant_compute(f) && !self.tilable_loops(f).is_empty())
            .map(|f| f.name().to_owned())
            .collect()
    }
}

impl SketchRule for MultiLevelTiling {
    fn name(&self) -> &'static str {
        "multi_level_tiling"
    }

    fn num_applicable(&self, schedule: &IrSchedule, _task: &TuneTask) -> usize {
        self.candidate_funcs(schedule).len() * self.variants
    }

    fn apply(&self, schedule: &mut IrSchedule, branch: usize, _task: &TuneTask) -> Result<RuleApply> {
        let funcs = self.candidate_funcs(schedule);
        let Some(func_name) = funcs.get(branch / self.variants.max(1)) else {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        };
        let variant = branch % self.variants.max(1);
        let targets = match schedule.module().func(func_name) {
            Some(func) => self.tilable_loops(func),
            None => return RuleRejectedSnafu { rule: self.name() }.fail(),
        };

        for (loop_id, extent) in targets {
            let options = self.tile_options(extent);
            let pick = schedule.rng_mut().sample_uniform_int(0, options.len() as i64).context(SamplingSnafu)?;
            // The variant rotates the drawn option so sibling branches tile
            // differently even from identical random streams.
            let tile = options[(pick as usize + variant) % options.len()];
            schedule.split(&loop_id, &[extent / tile, tile]).context(ReplayFailedSnafu)?;
        }
        Ok(RuleApply::Apply)
    }
}
