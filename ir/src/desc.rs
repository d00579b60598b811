//! Serializable schedule descriptors.
//!
//! A [`ScheduleDescriptor`] is the ordered trace of primitive steps applied
//! to a base module. It is the unit of persistence (database records store
//! its bincode byte form) and the unit of mutation (mutation rules rewrite
//! steps and replay). Replaying the same descriptor on the same base module
//! yields a module with an identical structural hash.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{DescriptorCodecSnafu, Result};
use crate::expr::ThreadAxis;
use crate::schedule::IrSchedule;

/// One primitive step of a schedule trace.
///
/// Handles are the stable string identifiers of loops and blocks at the time
/// the step applies; replay resolves them against the evolving module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    Split { loop_id: String, factors: SmallVec<[i64; 4]> },
    Fuse { loops: SmallVec<[String; 2]> },
    Reorder { loops: SmallVec<[String; 4]> },
    Parallel { loop_id: String },
    Vectorize { loop_id: String },
    Unroll { loop_id: String },
    Bind { loop_id: String, axis: ThreadAxis },
    ComputeInline { block: String },
    AnnotateUnroll { func: String, max_step: i64 },
}

impl Step {
    /// Primitive name, from the closed set.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Split { .. } => "split",
            Self::Fuse { .. } => "fuse",
            Self::Reorder { .. } => "reorder",
            Self::Parallel { .. } => "parallel",
            Self::Vectorize { .. } => "vectorize",
            Self::Unroll { .. } => "unroll",
            Self::Bind { .. } => "bind",
            Self::ComputeInline { .. } => "compute_inline",
            Self::AnnotateUnroll { .. } => "annotate_unroll",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Split { loop_id, factors } => write!(f, "split({loop_id}, {factors:?})"),
            Self::Fuse { loops } => write!(f, "fuse({loops:?})"),
            Self::Reorder { loops } => write!(f, "reorder({loops:?})"),
            Self::Parallel { loop_id } => write!(f, "parallel({loop_id})"),
            Self::Vectorize { loop_id } => write!(f, "vectorize({loop_id})"),
            Self::Unroll { loop_id } => write!(f, "unroll({loop_id})"),
            Self::Bind { loop_id, axis } => write!(f, "bind({loop_id}, {axis})"),
            Self::ComputeInline { block } => write!(f, "compute_inline({block})"),
            Self::AnnotateUnroll { func, max_step } => write!(f, "annotate_unroll({func}, {max_step})"),
        }
    }
}

/// Ordered, replayable trace of schedule primitives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    steps: Vec<Step>,
}

impl ScheduleDescriptor {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Lossless byte form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.steps).map_err(|e| DescriptorCodecSnafu { message: e.to_string() }.build())
    }

    /// Decode the byte form produced by [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let steps = bincode::deserialize(bytes).map_err(|e| DescriptorCodecSnafu { message: e.to_string() }.build())?;
        Ok(Self { steps })
    }

    /// Hash of the literal step sequence. Distinct from the *normalized*
    /// identity of a schedule, which is the structural hash of the module
    /// the trace replays into.
    pub fn trace_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.steps.hash(&mut h);
        h.finish()
    }

    /// Replay every step onto `schedule`, in order.
    ///
    /// The target re-records the steps as its primitives succeed, so after a
    /// successful replay `schedule.trace()` equals `self`. A failing step
    /// aborts the replay; earlier steps remain applied.
    pub fn replay_on(&self, schedule: &mut IrSchedule) -> Result<()> {
        for step in &self.steps {
            tracing::trace!(step = %step, "replay");
            match step {
                Step::Split { loop_id, factors } => {
                    schedule.split(loop_id, factors)?;
                }
                Step::Fuse { loops } => {
                    let ids: Vec<&str> = loops.iter().map(String::as_str).collect();
                    schedule.fuse(&ids)?;
                }
                Step::Reorder { loops } => {
                    let ids: Vec<&str> = loops.iter().map(String::as_str).collect();
                    schedule.reorder(&ids)?;
                }
                Step::Parallel { loop_id } => schedule.parallel(loop_id)?,
                Step::Vectorize { loop_id } => schedule.vectorize(loop_id)?,
                Step::Unroll { loop_id } => schedule.unroll(loop_id)?,
                Step::Bind { loop_id, axis } => schedule.bind(loop_id, *axis)?,
                Step::ComputeInline { block } => schedule.compute_inline(block)?,
                Step::AnnotateUnroll { func, max_step } => schedule.annotate_unroll(func, *max_step)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for ScheduleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{step}")?;
        }
        write!(f, "]")
    }
}
