//! Inline trivial blocks into their consumers.

use kuzna_ir::{ExprNode, IrSchedule};
use snafu::ResultExt;

use super::{RuleApply, SketchRule};
use crate::error::*;
use crate::task::TuneTask;

/// Inlines elementwise producer blocks so the remaining rules schedule only
/// the significant computes. Branch `b` inlines the first `b + 1` candidate
/// blocks in module order, which gives the pipeline a spectrum from "inline
/// one" to "inline everything inlinable".
pub struct AutoInline;

fn candidates(schedule: &IrSchedule) -> Vec<String> {
    let mut out = Vec::new();
    for func in schedule.module_exprs() {
        for r in func.computes() {
            if let ExprNode::Compute { name, trivial: true, inlined: false } = func.node(r) {
                out.push(name.clone());
            }
        }
    }
    out
}

impl SketchRule for AutoInline {
    fn name(&self) -> &'static str {
        "auto_inline"
    }

    fn num_applicable(&self, schedule: &IrSchedule, _task: &TuneTask) -> usize {
        candidates(schedule).len()
    }

    fn apply(&self, schedule: &mut IrSchedule, branch: usize, _task: &TuneTask) -> Result<RuleApply> {
        let blocks = candidates(schedule);
        if branch >= blocks.len() {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        }
        for block in &blocks[..=branch] {
            schedule.compute_inline(block).context(ReplayFailedSnafu)?;
        }
        Ok(RuleApply::Apply)
    }
}
