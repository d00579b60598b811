//! Cost-model abstraction seen by the search.
//!
//! The search treats the model as opaque: a pure, deterministic, cheap
//! function from a schedule to a predicted latency. Lower is better; `+inf`
//! means unscorable and keeps a candidate out of the best set. Model
//! retraining, if any, happens between sessions.

use kuzna_ir::schedule::AUTO_UNROLL_ATTR;
use kuzna_ir::{ExprNode, ExprRef, FuncExpr, IrSchedule, LoopKind};

/// Predicted-latency oracle.
pub trait CostModel {
    /// Predicted latency of the schedule; lower is better, `+inf` =
    /// unscorable. Must be pure and deterministic for a fixed model
    /// snapshot, and O(size of IR).
    fn predict(&self, schedule: &IrSchedule) -> f64;
}

/// Map a raw prediction into the search's domain: NaN is unscorable.
pub(crate) fn sanitize_cost(cost: f64) -> f64 {
    if cost.is_nan() { f64::INFINITY } else { cost }
}

/// Relative gain assumed for a fully unrolled loop.
const UNROLL_GAIN: f64 = 1.25;
/// Relative weight of a trivial (elementwise) block versus a full compute.
const TRIVIAL_WEIGHT: f64 = 0.5;
/// Whole-function discount when an unroll-depth hint is present.
const UNROLL_HINT_DISCOUNT: f64 = 0.95;

/// Analytic reference model: iteration volume discounted by the parallel,
/// vector, and unroll structure of the schedule.
///
/// Not a trained model; exists so searches, tests, and demos have a
/// deterministic oracle with plausible preferences (tiled + parallel +
/// vectorized schedules win over naive ones).
#[derive(Debug, Clone)]
pub struct LoopFeatureCostModel {
    /// Speedup cap for parallel and GPU-bound loops.
    pub parallel_width: f64,
    /// Speedup cap for vectorized loops.
    pub vector_width: f64,
}

impl Default for LoopFeatureCostModel {
    fn default() -> Self {
        Self { parallel_width: 16.0, vector_width: 8.0 }
    }
}

impl LoopFeatureCostModel {
    fn func_cost(&self, func: &FuncExpr) -> f64 {
        let mut acc = 0.0;
        self.walk(func, func.root(), 1.0, 1.0, &mut acc);
        let hinted = func.attr(AUTO_UNROLL_ATTR).unwrap_or(0) > 0;
        if hinted { acc * UNROLL_HINT_DISCOUNT } else { acc }
    }

    fn walk(&self, func: &FuncExpr, r: ExprRef, volume: f64, speedup: f64, acc: &mut f64) {
        match func.node(r) {
            ExprNode::Loop { extent, kind, body, .. } => {
                let e = *extent as f64;
                let gain = match kind {
                    LoopKind::Serial => 1.0,
                    LoopKind::Parallel | LoopKind::Bound(_) => e.min(self.parallel_width),
                    LoopKind::Vectorize => e.min(self.vector_width),
                    LoopKind::Unroll => UNROLL_GAIN,
                };
                self.walk(func, *body, volume * e, speedup * gain, acc);
            }
            ExprNode::Seq { stmts } => {
                for &s in stmts {
                    self.walk(func, s, volume, speedup, acc);
                }
            }
            ExprNode::Compute { trivial, inlined, .. } => {
                if !*inlined {
                    let weight = if *trivial { TRIVIAL_WEIGHT } else { 1.0 };
                    *acc += volume * weight / speedup;
                }
            }
        }
    }
}

impl CostModel for LoopFeatureCostModel {
    fn predict(&self, schedule: &IrSchedule) -> f64 {
        schedule.module_exprs().iter().map(|f| self.func_cost(f)).sum()
    }
}
