//! Parallelize or bind the outermost loops.

use kuzna_ir::{ExprNode, FuncExpr, IrSchedule, LoopKind, ThreadAxis};
use snafu::ResultExt;

use super::{RuleApply, SketchRule};
use crate::error::*;
use crate::task::{Target, TuneTask};

/// Maps the outermost serial loop of a function onto the target's coarse
/// parallelism: a multi-core `parallel` on CPU, a `blockIdx.x`/`threadIdx.x`
/// binding pair on GPU. A GPU binding finishes the sketch - the remaining
/// CPU-oriented rules are pruned.
pub struct ParallelizeOuter;

/// The outermost serial loop of each stage of the function.
fn outer_loops(func: &FuncExpr) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![func.root()];
    while let Some(r) = stack.pop() {
        match func.node(r) {
            ExprNode::Loop { var, kind: LoopKind::Serial, .. } => out.push(var.clone()),
            ExprNode::Loop { .. } => {}
            ExprNode::Seq { stmts } => stack.extend(stmts.iter().rev().copied()),
            ExprNode::Compute { .. } => {}
        }
    }
    out
}

fn candidate_funcs(schedule: &IrSchedule) -> Vec<String> {
    schedule
        .module_exprs()
        .iter()
        .filter(|f| !outer_loops(f).is_empty())
        .map(|f| f.name().to_owned())
        .collect()
}

impl SketchRule for ParallelizeOuter {
    fn name(&self) -> &'static str {
        "parallelize_outer"
    }

    fn num_applicable(&self, schedule: &IrSchedule, _task: &TuneTask) -> usize {
        candidate_funcs(schedule).len()
    }

    fn apply(&self, schedule: &mut IrSchedule, branch: usize, task: &TuneTask) -> Result<RuleApply> {
        let funcs = candidate_funcs(schedule);
        let Some(func_name) = funcs.get(branch) else {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        };
        let loops = match schedule.module().func(func_name) {
            Some(func) => outer_loops(func),
            None => return RuleRejectedSnafu { rule: self.name() }.fail(),
        };
        let Some(outer) = loops.first() else {
            return RuleRejectedSnafu { rule: self.name() }.fail();
        };

        match task.target() {
            Target::Cpu { .. } => {
                schedule.parallel(outer).context(ReplayFailedSnafu)?;
                Ok(RuleApply::Apply)
            }
            Target::Gpu { .. } => {
                // Bind the outer loop to the grid and, when the nest allows,
                // its direct child to the block.
                let child = direct_serial_child(schedule, outer);
                schedule.bind(outer, ThreadAxis::BlockX).context(ReplayFailedSnafu)?;
                if let Some(child) = child {
                    schedule.bind(&child, ThreadAxis::ThreadX).context(ReplayFailedSnafu)?;
                }
                Ok(RuleApply::ApplyAndPrune)
            }
        }
    }
}

fn direct_serial_child(schedule: &IrSchedule, loop_id: &str) -> Option<String> {
    for func in schedule.module_exprs() {
        let Some(r) = func.find_loop(loop_id) else { continue };
        let ExprNode::Loop { body, .. } = func.node(r) else { continue };
        if let ExprNode::Loop { var, kind: LoopKind::Serial, .. } = func.node(*body) {
            return Some(var.clone());
        }
    }
    None
}
