//! Test utilities for search tests.
//!
//! Provides canonical schedulable modules (matmul nest, elementwise
//! pipeline), session plumbing, and controllable cost models.

use kuzna_ir::{FuncExpr, IrSchedule, Module, RandomEngine};

use crate::cost::CostModel;
use crate::state::SearchState;
use crate::task::{Target, TaskRegistry, TuneTask};

/// A single matmul-shaped function: `i`/`j`/`k` nest around block `C`.
pub fn matmul_module() -> Module {
    Module::new(vec![FuncExpr::loop_nest("matmul", &[("i", 64), ("j", 64), ("k", 64)], "C")])
}

/// A two-stage elementwise pipeline with an inlinable producer.
pub fn elementwise_module() -> Module {
    Module::new(vec![
        FuncExpr::builder("ewise").trivial_nest(&[("i0", 128)], "scale").nest(&[("i1", 128)], "out").build(),
    ])
}

/// A module with two independently scheduled functions, for crossover tests.
pub fn two_func_module() -> Module {
    Module::new(vec![
        FuncExpr::loop_nest("stage0", &[("i", 32), ("j", 32)], "A"),
        FuncExpr::loop_nest("stage1", &[("x", 16), ("y", 16)], "B"),
    ])
}

/// Register `module` under `task_key` in a fresh registry and resolve the
/// task against a host CPU target.
pub fn host_task(module: Module, task_key: &str) -> (TaskRegistry, TuneTask) {
    let registry = TaskRegistry::new();
    registry.register(task_key, module);
    let task = TuneTask::new(&registry, task_key, Target::host()).unwrap();
    (registry, task)
}

/// A scored state over a one-loop module; distinct extents give distinct
/// identities.
pub fn state_with_extent(extent: i64, cost: f64) -> SearchState {
    let module = Module::new(vec![FuncExpr::loop_nest("f", &[("i", extent)], "C")]);
    SearchState::with_cost(IrSchedule::new(module, RandomEngine::new(5)), cost)
}

/// Cost model returning the same value for every schedule. Makes selection
/// depend purely on tie-breaking and ordering rules.
pub struct ConstantCostModel(pub f64);

impl CostModel for ConstantCostModel {
    fn predict(&self, _schedule: &IrSchedule) -> f64 {
        self.0
    }
}

/// Cost model that always fails to score.
pub struct UnscorableCostModel;

impl CostModel for UnscorableCostModel {
    fn predict(&self, _schedule: &IrSchedule) -> f64 {
        f64::NAN
    }
}

/// Cost model scoring by trace length: shorter traces are "faster". Gives
/// deterministic, structure-sensitive orderings without the analytic model's
/// magnitudes.
pub struct TraceLengthCostModel;

impl CostModel for TraceLengthCostModel {
    fn predict(&self, schedule: &IrSchedule) -> f64 {
        schedule.trace().len() as f64
    }
}
