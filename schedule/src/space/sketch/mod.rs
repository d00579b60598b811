//! Sketch generation rules.
//!
//! A sketch rule builds schedule candidates from scratch on the base module.
//! Rules expose discrete branches: `num_applicable` counts the distinct ways
//! the rule could rewrite the given schedule, and `apply` performs one of
//! them in place. The strategy driving the rules decides whether to expand
//! every branch (`rule_prune`) or take one at random (`random_prune`); a
//! rule can also declare that its rewrite prunes the remaining rule pipeline
//! for that sketch.

pub mod auto_inline;
pub mod auto_unroll;
pub mod multi_level_tiling;
pub mod parallelize_outer;

pub use auto_inline::AutoInline;
pub use auto_unroll::AutoUnroll;
pub use multi_level_tiling::MultiLevelTiling;
pub use parallelize_outer::ParallelizeOuter;

use kuzna_ir::IrSchedule;
use once_cell::sync::Lazy;

use crate::error::Result;
use crate::task::TuneTask;

/// What a successful rule application means for the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleApply {
    /// Keep applying the remaining rules to this sketch.
    Apply,
    /// This sketch is finished; skip the remaining rules.
    ApplyAndPrune,
}

/// A candidate-construction strategy over the base module.
///
/// Rules are stateless (all per-sketch randomness flows through the
/// schedule's own engine), so the stock catalog is shared process-wide.
pub trait SketchRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of applicable branches on this schedule; 0 = not applicable.
    fn num_applicable(&self, schedule: &IrSchedule, task: &TuneTask) -> usize;

    /// Apply branch `branch` (in `0..num_applicable`) in place.
    fn apply(&self, schedule: &mut IrSchedule, branch: usize, task: &TuneTask) -> Result<RuleApply>;
}

/// The stock rule pipeline, in application order.
pub(crate) static SKETCH_RULES: Lazy<Vec<Box<dyn SketchRule>>> = Lazy::new(|| {
    vec![
        Box::new(AutoInline),
        Box::new(MultiLevelTiling::default()),
        Box::new(ParallelizeOuter),
        Box::new(AutoUnroll::default()),
    ]
});
