//! Evolutionary auto-scheduling core for the kuzna tensor compiler.
//!
//! Given a task's lowered IR module, this crate searches for a
//! high-performing schedule by combining database lookup, rule-based sketch
//! generation, crossover, mutation, and cost-model-guided selection.
//!
//! # Module Organization
//!
//! - [`search`] - the [`EvolutionarySearch`] session: generation loop,
//!   crossover, eps-greedy selection, visited-set deduplication
//! - [`space`] - the per-task [`SearchSpace`]: sketch rules, mutation rules,
//!   and the schedule-then-mutate step
//! - [`cost`] - the [`CostModel`] seam and an analytic reference model
//! - [`database`] - ranked [`TuningRecord`] stores (in-memory and sled)
//! - [`task`] - [`TuneTask`], [`TaskRegistry`], and target descriptors
//! - [`state`] - [`SearchState`], the bounded best set, and the visited set
//! - [`tuning`] - per-call [`TuningOptions`]
//!
//! The schedulable IR itself (modules, primitives, replayable descriptors,
//! the deterministic random engine) lives in [`kuzna_ir`].
//!
//! # Example
//!
//! ```
//! use kuzna_ir::{FuncExpr, Module};
//! use kuzna_schedule::{
//!     EvolutionarySearch, LoopFeatureCostModel, MemoryDatabase, Target, TaskRegistry, TuneTask,
//!     TuningOptions,
//! };
//!
//! let registry = TaskRegistry::new();
//! registry.register("matmul_64", Module::new(vec![
//!     FuncExpr::loop_nest("matmul", &[("i", 64), ("j", 64), ("k", 64)], "C"),
//! ]));
//!
//! let task = TuneTask::new(&registry, "matmul_64", Target::host()).unwrap();
//! let cost_model = LoopFeatureCostModel::default();
//! let database = MemoryDatabase::new();
//!
//! let mut search = EvolutionarySearch::new(task, &cost_model, &database, 42);
//! let options = TuningOptions::builder().pick_database_topk(0).build();
//! let candidates = search.search_eps_greedy(&options).unwrap();
//! assert!(!candidates.is_empty());
//! ```

pub mod cost;
pub mod database;
pub mod error;
pub mod search;
pub mod space;
pub mod state;
pub mod task;
pub mod tuning;

#[cfg(test)]
pub mod test;

// Re-export the IR-side types the search API surfaces.
pub use kuzna_ir::{IrSchedule, Module, RandomEngine, ScheduleDescriptor, Step};

pub use cost::{CostModel, LoopFeatureCostModel};
pub use database::{Database, MemoryDatabase, SledDatabase, TuningRecord};
pub use error::{Error, Result};
pub use search::EvolutionarySearch;
pub use space::{SearchSpace, SketchStrategy};
pub use space::mutate::MutateRule;
pub use space::sketch::{RuleApply, SketchRule};
pub use state::{BoundedBestSet, SearchState, VisitedSet};
pub use task::{Target, TaskRegistry, TuneTask};
pub use tuning::TuningOptions;
