use snafu::Snafu;

use crate::expr::LoopKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A primitive referenced a loop handle that does not exist.
    #[snafu(display("loop `{loop_id}` not found in module"))]
    LoopNotFound { loop_id: String },

    /// A primitive referenced a block handle that does not exist.
    #[snafu(display("block `{block}` not found in module"))]
    BlockNotFound { block: String },

    /// A primitive referenced a function that does not exist.
    #[snafu(display("function `{func}` not found in module"))]
    FuncNotFound { func: String },

    /// Split factors must multiply to the loop extent.
    #[snafu(display("split factors {factors:?} do not multiply to extent {extent} of loop `{loop_id}`"))]
    SplitProductMismatch { loop_id: String, factors: Vec<i64>, extent: i64 },

    /// Split factors must all be positive.
    #[snafu(display("split factor must be positive, got {factor} for loop `{loop_id}`"))]
    NonPositiveFactor { loop_id: String, factor: i64 },

    /// Split into fewer than two parts is the identity.
    #[snafu(display("split requires at least two factors, got {count}"))]
    TooFewFactors { count: usize },

    /// Fuse needs at least two loops to do anything.
    #[snafu(display("fuse requires at least two loops, got {count}"))]
    TooFewLoops { count: usize },

    /// The named loops must form one perfectly nested chain, outermost first.
    #[snafu(display("loops {loops:?} are not perfectly nested in listed order"))]
    NotPerfectlyNested { loops: Vec<String> },

    /// Reorder takes a permutation of a perfect nest, without repetition.
    #[snafu(display("duplicate loop `{loop_id}` in reorder list"))]
    DuplicateLoop { loop_id: String },

    /// Execution-kind primitives only apply to still-serial loops.
    #[snafu(display("loop `{loop_id}` already carries a {kind:?} annotation"))]
    LoopAlreadyAnnotated { loop_id: String, kind: LoopKind },

    /// Vectorization is only defined for a loop with no nested loops.
    #[snafu(display("vectorize requires an innermost loop, `{loop_id}` contains nested loops"))]
    NotInnermost { loop_id: String },

    /// Only trivial (elementwise) blocks may be inlined into their consumer.
    #[snafu(display("block `{block}` is not inlinable"))]
    NotInlinable { block: String },

    /// Inlining the same block twice is a replay defect, not a no-op.
    #[snafu(display("block `{block}` is already inlined"))]
    AlreadyInlined { block: String },

    /// Uniform sampling over an empty half-open interval.
    #[snafu(display("empty sample range [{lo}, {hi})"))]
    EmptySampleRange { lo: i64, hi: i64 },

    /// Descriptor byte form could not be encoded or decoded.
    #[snafu(display("schedule descriptor codec failure: {message}"))]
    DescriptorCodec { message: String },
}
