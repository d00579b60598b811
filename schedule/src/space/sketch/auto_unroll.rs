//! Annotate functions with an unroll-depth hint.

use kuzna_ir::schedule::AUTO_UNROLL_ATTR;
use kuzna_ir::{ExprNode, FuncExpr, IrSchedule};
use snafu::ResultExt;

use super::{RuleApply, SketchRule};
use crate::error::*;
use crate::space::AUTO_UNROLL_STEPS;
use crate::task::TuneTask;

/// Attaches an `auto_unroll_max_step` hint to a function. Branches enumerate
/// the candidate steps per eligible function, so the pipeline explores every
/// depth. Later lowering stages interpret the hint; here it only has to be
/// part of the explored space.
pub struct AutoUnroll {
    pub steps: Vec<i64>,
}

impl Default for AutoUnroll {
    fn default() -> Self {
        Self { steps: AUTO_UNROLL_STEPS.to_vec() }
    }
}

fn deep_enough(func: &FuncExpr) -> bool {
    func.loops().len() >= 2
        && func
            .computes()
            .into_iter()
            .any(|r| matches!(func.node(r), ExprNode::Compute { inlined: false, .. }))
}

impl AutoUnroll {
    fn candidate_funcs(&self, schedule: &IrSchedule) -> Vec<String> {
        schedule
            .module_exprs()
            .iter()
            .filter(|f| f.attr(AUTO_UNROLL_ATTR).is_none() && deep_enough(f))
            .map(|f| f.name().to_owned())
            .collect()
    }
}

impl SketchRule for AutoUnroll {
    fn name(&self) -> &'static str {
        "auto_unroll"
    }

    fn num_applicable(&self, schedule: &IrSchedule, _task: &TuneTask) -> usize {
        self.candidate_funcs(schedule).len() * self.steps.len()
    }

    fn apply(&self, schedule: &mut IrSchedule, branch: usize, _task: &TuneTask) -> Result<RuleApply> {
        if self.steps.is_empty() {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        }
        let funcs = self.candidate_funcs(schedule);
        let Some(func_name) = funcs.get(branch / self.steps.len()) else {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        };
        let max_step = self.steps[branch % self.steps.len()];
        schedule.annotate_unroll(func_name, max_step).context(ReplayFailedSnafu)?;
        Ok(RuleApply::Apply)
    }
}
