//! Schedulable IR for the kuzna auto-scheduler.
//!
//! This crate owns everything the search core treats as "the IR engine":
//!
//! - [`expr`] - arena-backed module expressions ([`Module`], [`FuncExpr`])
//!   with deep copy and structural hashing
//! - [`schedule`] - the live [`IrSchedule`] and the primitive
//!   transformations rules apply (split, fuse, reorder, parallel, vectorize,
//!   unroll, bind, compute_inline, annotate_unroll)
//! - [`desc`] - the serializable, replayable [`ScheduleDescriptor`] trace
//! - [`random`] - the deterministic [`RandomEngine`] forked into every
//!   schedule
//!
//! Search code never touches primitives directly; it replays descriptors and
//! hands schedules to rules.

pub mod desc;
pub mod error;
pub mod expr;
pub mod random;
pub mod schedule;

pub use desc::{ScheduleDescriptor, Step};
pub use error::{Error, Result};
pub use expr::{ExprNode, ExprRef, FuncExpr, FuncExprBuilder, LoopKind, Module, ThreadAxis};
pub use random::RandomEngine;
pub use schedule::{AUTO_UNROLL_ATTR, IrSchedule};
