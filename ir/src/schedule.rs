//! Live schedule state and the primitive transformations applied by rules.
//!
//! An [`IrSchedule`] owns a deep-copied [`Module`], the descriptor trace
//! accumulated so far, and a forked [`RandomEngine`]. Search code never calls
//! primitives directly; rules do, and every successful primitive records a
//! [`Step`] so the resulting schedule can be replayed bit-for-bit on a fresh
//! copy of the base module (modulo identifier regeneration).
//!
//! Primitives validate before they mutate: a failed call leaves the schedule
//! untouched.

use snafu::ensure;

use crate::desc::{ScheduleDescriptor, Step};
use crate::error::*;
use crate::expr::{ExprNode, ExprRef, FuncExpr, LoopKind, Module, ThreadAxis};
use crate::random::RandomEngine;

/// Annotation key set by [`IrSchedule::annotate_unroll`].
pub const AUTO_UNROLL_ATTR: &str = "auto_unroll_max_step";

/// A mutable schedule over an exclusively owned module copy.
#[derive(Debug, Clone)]
pub struct IrSchedule {
    module: Module,
    trace: ScheduleDescriptor,
    rng: RandomEngine,
}

impl IrSchedule {
    /// Wrap a module copy. The caller passes an already deep-copied module;
    /// the schedule becomes its exclusive owner.
    pub fn new(module: Module, rng: RandomEngine) -> Self {
        Self { module, trace: ScheduleDescriptor::default(), rng }
    }

    /// Build a schedule from per-function expressions, e.g. the mixed
    /// output of a crossover.
    pub fn from_exprs(funcs: Vec<FuncExpr>, rng: RandomEngine) -> Self {
        Self::new(Module::new(funcs), rng)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// One expression per function of the module, in lowering order.
    pub fn module_exprs(&self) -> &[FuncExpr] {
        self.module.funcs()
    }

    pub fn trace(&self) -> &ScheduleDescriptor {
        &self.trace
    }

    pub fn rng_mut(&mut self) -> &mut RandomEngine {
        &mut self.rng
    }

    /// Structural hash of the current module; the normalized identity of the
    /// trace applied so far.
    pub fn structural_hash(&self) -> u64 {
        self.module.structural_hash()
    }

    /// Independent copy: cloned module and trace, forked RNG.
    pub fn deep_copy(&mut self) -> IrSchedule {
        IrSchedule { module: self.module.clone(), trace: self.trace.clone(), rng: self.rng.fork() }
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Split a serial loop into a nest of loops with the given extents,
    /// outermost first. Factors must be positive and multiply to the loop
    /// extent. Returns the identifiers of the new loops (`i` becomes
    /// `i.0`, `i.1`, ...).
    pub fn split(&mut self, loop_id: &str, factors: &[i64]) -> Result<Vec<String>> {
        ensure!(factors.len() >= 2, TooFewFactorsSnafu { count: factors.len() });
        let (fi, lr) = self.locate_loop(loop_id)?;
        let ExprNode::Loop { var, extent, kind, body } = self.module.funcs()[fi].node(lr).clone() else {
            return LoopNotFoundSnafu { loop_id }.fail();
        };
        ensure!(kind == LoopKind::Serial, LoopAlreadyAnnotatedSnafu { loop_id, kind });
        for &factor in factors {
            ensure!(factor > 0, NonPositiveFactorSnafu { loop_id, factor });
        }
        let product: i64 = factors.iter().product();
        ensure!(product == extent, SplitProductMismatchSnafu { loop_id, factors: factors.to_vec(), extent });

        let func = &mut self.module.funcs_mut()[fi];
        let mut new_ids = vec![String::new(); factors.len()];
        let mut nested = body;
        for (idx, &factor) in factors.iter().enumerate().rev() {
            let id = format!("{var}.{idx}");
            nested = func.push(ExprNode::Loop { var: id.clone(), extent: factor, kind: LoopKind::Serial, body: nested });
            new_ids[idx] = id;
        }
        func.replace_child(lr, nested);

        self.trace.push(Step::Split { loop_id: loop_id.to_owned(), factors: factors.iter().copied().collect() });
        Ok(new_ids)
    }

    /// Fuse a perfectly nested chain of serial loops (outermost first) into
    /// one loop whose extent is the product. Returns the fused identifier.
    pub fn fuse(&mut self, loops: &[&str]) -> Result<String> {
        ensure!(loops.len() >= 2, TooFewLoopsSnafu { count: loops.len() });
        let (fi, chain) = self.locate_chain(loops)?;

        let mut extent: i64 = 1;
        // Overwritten on every chain member; ends at the innermost body.
        let mut innermost_body = chain[0];
        for &r in &chain {
            let ExprNode::Loop { extent: e, kind, body, var } = self.module.funcs()[fi].node(r) else {
                return NotPerfectlyNestedSnafu { loops: owned(loops) }.fail();
            };
            ensure!(*kind == LoopKind::Serial, LoopAlreadyAnnotatedSnafu { loop_id: var.clone(), kind: *kind });
            extent *= e;
            innermost_body = *body;
        }

        let fused_id = format!("{}_fused", loops.join("_"));
        let func = &mut self.module.funcs_mut()[fi];
        let fused =
            func.push(ExprNode::Loop { var: fused_id.clone(), extent, kind: LoopKind::Serial, body: innermost_body });
        func.replace_child(chain[0], fused);

        self.trace.push(Step::Fuse { loops: loops.iter().map(|s| (*s).to_owned()).collect() });
        Ok(fused_id)
    }

    /// Reorder the loops of one perfectly nested serial chain. `order` names
    /// every loop of the chain exactly once, outermost first in the desired
    /// arrangement.
    pub fn reorder(&mut self, order: &[&str]) -> Result<()> {
        ensure!(order.len() >= 2, TooFewLoopsSnafu { count: order.len() });
        for (i, id) in order.iter().enumerate() {
            if order[..i].contains(id) {
                return DuplicateLoopSnafu { loop_id: *id }.fail();
            }
        }

        // The chain is identified by tree position, not by the listed order.
        let mut sorted = owned(order);
        sorted.sort();
        let (fi, chain) = self.locate_chain_unordered(&sorted)?;

        let mut header = Vec::with_capacity(order.len());
        for id in order {
            let r = self.module.funcs()[fi]
                .find_loop(id)
                .ok_or_else(|| LoopNotFoundSnafu { loop_id: *id }.build())?;
            let ExprNode::Loop { var, extent, kind, .. } = self.module.funcs()[fi].node(r).clone() else {
                return LoopNotFoundSnafu { loop_id: *id }.fail();
            };
            ensure!(kind == LoopKind::Serial, LoopAlreadyAnnotatedSnafu { loop_id: var, kind });
            header.push((var, extent));
        }

        let func = &mut self.module.funcs_mut()[fi];
        for (&slot, (var, extent)) in chain.iter().zip(header) {
            if let ExprNode::Loop { var: v, extent: e, .. } = func.node_mut(slot) {
                *v = var;
                *e = extent;
            }
        }

        self.trace.push(Step::Reorder { loops: order.iter().map(|s| (*s).to_owned()).collect() });
        Ok(())
    }

    /// Mark a serial loop for multi-core parallel execution.
    pub fn parallel(&mut self, loop_id: &str) -> Result<()> {
        self.annotate_kind(loop_id, LoopKind::Parallel, false)?;
        self.trace.push(Step::Parallel { loop_id: loop_id.to_owned() });
        Ok(())
    }

    /// Mark an innermost serial loop for SIMD execution.
    pub fn vectorize(&mut self, loop_id: &str) -> Result<()> {
        self.annotate_kind(loop_id, LoopKind::Vectorize, true)?;
        self.trace.push(Step::Vectorize { loop_id: loop_id.to_owned() });
        Ok(())
    }

    /// Mark a serial loop for full unrolling.
    pub fn unroll(&mut self, loop_id: &str) -> Result<()> {
        self.annotate_kind(loop_id, LoopKind::Unroll, false)?;
        self.trace.push(Step::Unroll { loop_id: loop_id.to_owned() });
        Ok(())
    }

    /// Bind a serial loop to a GPU thread axis.
    pub fn bind(&mut self, loop_id: &str, axis: ThreadAxis) -> Result<()> {
        self.annotate_kind(loop_id, LoopKind::Bound(axis), false)?;
        self.trace.push(Step::Bind { loop_id: loop_id.to_owned(), axis });
        Ok(())
    }

    /// Inline a trivial block into its consumer.
    pub fn compute_inline(&mut self, block: &str) -> Result<()> {
        let (fi, cr) = self.locate_compute(block)?;
        let ExprNode::Compute { trivial, inlined, .. } = *self.module.funcs()[fi].node(cr) else {
            return BlockNotFoundSnafu { block }.fail();
        };
        ensure!(trivial, NotInlinableSnafu { block });
        ensure!(!inlined, AlreadyInlinedSnafu { block });

        if let ExprNode::Compute { inlined, .. } = self.module.funcs_mut()[fi].node_mut(cr) {
            *inlined = true;
        }
        self.trace.push(Step::ComputeInline { block: block.to_owned() });
        Ok(())
    }

    /// Attach an unroll-depth hint to a function.
    pub fn annotate_unroll(&mut self, func: &str, max_step: i64) -> Result<()> {
        let slot = self
            .module
            .funcs_mut()
            .iter_mut()
            .find(|f| f.name() == func)
            .ok_or_else(|| FuncNotFoundSnafu { func }.build())?;
        slot.set_attr(AUTO_UNROLL_ATTR, max_step);
        self.trace.push(Step::AnnotateUnroll { func: func.to_owned(), max_step });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup helpers
    // ------------------------------------------------------------------

    fn locate_loop(&self, loop_id: &str) -> Result<(usize, ExprRef)> {
        for (i, f) in self.module.funcs().iter().enumerate() {
            if let Some(r) = f.find_loop(loop_id) {
                return Ok((i, r));
            }
        }
        LoopNotFoundSnafu { loop_id }.fail()
    }

    fn locate_compute(&self, block: &str) -> Result<(usize, ExprRef)> {
        for (i, f) in self.module.funcs().iter().enumerate() {
            if let Some(r) = f.find_compute(block) {
                return Ok((i, r));
            }
        }
        BlockNotFoundSnafu { block }.fail()
    }

    /// Resolve `loops` (outermost first) to a directly nested chain.
    fn locate_chain(&self, loops: &[&str]) -> Result<(usize, Vec<ExprRef>)> {
        let (fi, mut cur) = self.locate_loop(loops[0])?;
        let func = &self.module.funcs()[fi];
        let mut chain = vec![cur];
        for id in &loops[1..] {
            let ExprNode::Loop { body, .. } = func.node(cur) else {
                return NotPerfectlyNestedSnafu { loops: owned(loops) }.fail();
            };
            match func.node(*body) {
                ExprNode::Loop { var, .. } if var == id => {
                    cur = *body;
                    chain.push(cur);
                }
                _ => return NotPerfectlyNestedSnafu { loops: owned(loops) }.fail(),
            }
        }
        Ok((fi, chain))
    }

    /// Resolve a set of loop names to a directly nested chain, regardless of
    /// the order they were listed in.
    fn locate_chain_unordered(&self, names: &[String]) -> Result<(usize, Vec<ExprRef>)> {
        let (fi, first) = self.locate_loop(&names[0])?;
        let func = &self.module.funcs()[fi];

        // Walk up to the topmost listed loop, then down through the chain.
        let mut top = first;
        loop {
            match func.parent_of(top) {
                Some(p) => match func.node(p) {
                    ExprNode::Loop { var, .. } if names.iter().any(|n| n == var) => top = p,
                    _ => break,
                },
                None => break,
            }
        }

        let mut chain = vec![top];
        let mut cur = top;
        while chain.len() < names.len() {
            let ExprNode::Loop { body, .. } = func.node(cur) else {
                return NotPerfectlyNestedSnafu { loops: names.to_vec() }.fail();
            };
            match func.node(*body) {
                ExprNode::Loop { var, .. } if names.iter().any(|n| n == var) => {
                    cur = *body;
                    chain.push(cur);
                }
                _ => return NotPerfectlyNestedSnafu { loops: names.to_vec() }.fail(),
            }
        }
        Ok((fi, chain))
    }

    fn annotate_kind(&mut self, loop_id: &str, kind: LoopKind, require_innermost: bool) -> Result<()> {
        let (fi, lr) = self.locate_loop(loop_id)?;
        let func = &self.module.funcs()[fi];
        let ExprNode::Loop { kind: current, body, .. } = func.node(lr).clone() else {
            return LoopNotFoundSnafu { loop_id }.fail();
        };
        ensure!(current == LoopKind::Serial, LoopAlreadyAnnotatedSnafu { loop_id, kind: current });
        if require_innermost {
            let mut has_inner_loop = false;
            let mut stack = vec![body];
            while let Some(r) = stack.pop() {
                match func.node(r) {
                    ExprNode::Loop { .. } => {
                        has_inner_loop = true;
                        break;
                    }
                    ExprNode::Seq { stmts } => stack.extend(stmts.iter().copied()),
                    ExprNode::Compute { .. } => {}
                }
            }
            ensure!(!has_inner_loop, NotInnermostSnafu { loop_id });
        }

        if let ExprNode::Loop { kind: slot, .. } = self.module.funcs_mut()[fi].node_mut(lr) {
            *slot = kind;
        }
        Ok(())
    }
}

fn owned(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| (*s).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matmul_schedule() -> IrSchedule {
        let module = Module::new(vec![FuncExpr::loop_nest("matmul", &[("i", 64), ("j", 64), ("k", 64)], "C")]);
        IrSchedule::new(module, RandomEngine::new(42))
    }

    #[test]
    fn test_split_creates_nest() {
        let mut sch = matmul_schedule();
        let new_ids = sch.split("i", &[16, 4]).unwrap();
        assert_eq!(new_ids, vec!["i.0", "i.1"]);

        let func = &sch.module().funcs()[0];
        assert!(func.find_loop("i").is_none());
        let outer = func.find_loop("i.0").unwrap();
        let inner = func.find_loop("i.1").unwrap();
        assert!(matches!(func.node(outer), ExprNode::Loop { extent: 16, .. }));
        assert!(matches!(func.node(inner), ExprNode::Loop { extent: 4, .. }));
        assert_eq!(func.parent_of(inner), Some(outer));
        assert_eq!(sch.trace().len(), 1);
    }

    #[test]
    fn test_split_three_way() {
        let mut sch = matmul_schedule();
        let new_ids = sch.split("k", &[4, 4, 4]).unwrap();
        assert_eq!(new_ids, vec!["k.0", "k.1", "k.2"]);
        assert_eq!(sch.module().funcs()[0].loops().len(), 5);
    }

    #[test]
    fn test_split_rejects_bad_factors() {
        let mut sch = matmul_schedule();
        assert!(matches!(sch.split("i", &[16]), Err(Error::TooFewFactors { .. })));
        assert!(matches!(sch.split("i", &[16, 3]), Err(Error::SplitProductMismatch { .. })));
        assert!(matches!(sch.split("i", &[-8, -8]), Err(Error::NonPositiveFactor { .. })));
        assert!(matches!(sch.split("nope", &[8, 8]), Err(Error::LoopNotFound { .. })));
        // Failed primitives record nothing.
        assert!(sch.trace().is_empty());
    }

    #[test]
    fn test_fuse_perfect_nest() {
        let mut sch = matmul_schedule();
        let fused = sch.fuse(&["i", "j"]).unwrap();
        assert_eq!(fused, "i_j_fused");

        let func = &sch.module().funcs()[0];
        let f = func.find_loop("i_j_fused").unwrap();
        assert!(matches!(func.node(f), ExprNode::Loop { extent: 4096, .. }));
        assert!(func.find_loop("i").is_none());
        assert!(func.find_loop("j").is_none());
        assert!(func.find_loop("k").is_some());
    }

    #[test]
    fn test_fuse_rejects_gap() {
        let mut sch = matmul_schedule();
        assert!(matches!(sch.fuse(&["i", "k"]), Err(Error::NotPerfectlyNested { .. })));
    }

    #[test]
    fn test_reorder_swaps_header() {
        let mut sch = matmul_schedule();
        sch.reorder(&["k", "j", "i"]).unwrap();

        let func = &sch.module().funcs()[0];
        let root = func.root();
        assert!(matches!(func.node(root), ExprNode::Loop { var, .. } if var == "k"));
        let chain1 = match func.node(root) {
            ExprNode::Loop { body, .. } => *body,
            _ => unreachable!(),
        };
        assert!(matches!(func.node(chain1), ExprNode::Loop { var, .. } if var == "j"));
    }

    #[test]
    fn test_reorder_rejects_duplicates() {
        let mut sch = matmul_schedule();
        assert!(matches!(sch.reorder(&["i", "i"]), Err(Error::DuplicateLoop { .. })));
    }

    #[test]
    fn test_annotation_kinds() {
        let mut sch = matmul_schedule();
        sch.parallel("i").unwrap();
        sch.unroll("j").unwrap();
        sch.vectorize("k").unwrap();

        let func = &sch.module().funcs()[0];
        let i = func.find_loop("i").unwrap();
        assert!(matches!(func.node(i), ExprNode::Loop { kind: LoopKind::Parallel, .. }));
        assert_eq!(sch.trace().len(), 3);
    }

    #[test]
    fn test_vectorize_requires_innermost() {
        let mut sch = matmul_schedule();
        assert!(matches!(sch.vectorize("i"), Err(Error::NotInnermost { .. })));
    }

    #[test]
    fn test_double_annotation_rejected() {
        let mut sch = matmul_schedule();
        sch.parallel("i").unwrap();
        assert!(matches!(sch.parallel("i"), Err(Error::LoopAlreadyAnnotated { .. })));
        assert!(matches!(sch.unroll("i"), Err(Error::LoopAlreadyAnnotated { .. })));
    }

    #[test]
    fn test_bind_gpu_axis() {
        let mut sch = matmul_schedule();
        sch.bind("i", ThreadAxis::BlockX).unwrap();
        let func = &sch.module().funcs()[0];
        let i = func.find_loop("i").unwrap();
        assert!(matches!(func.node(i), ExprNode::Loop { kind: LoopKind::Bound(ThreadAxis::BlockX), .. }));
    }

    #[test]
    fn test_compute_inline() {
        let module = Module::new(vec![
            FuncExpr::builder("f").trivial_nest(&[("i0", 32)], "scale").nest(&[("i1", 32)], "out").build(),
        ]);
        let mut sch = IrSchedule::new(module, RandomEngine::new(1));

        sch.compute_inline("scale").unwrap();
        assert!(matches!(sch.compute_inline("scale"), Err(Error::AlreadyInlined { .. })));
        assert!(matches!(sch.compute_inline("out"), Err(Error::NotInlinable { .. })));
        assert!(matches!(sch.compute_inline("missing"), Err(Error::BlockNotFound { .. })));
    }

    #[test]
    fn test_annotate_unroll() {
        let mut sch = matmul_schedule();
        sch.annotate_unroll("matmul", 64).unwrap();
        assert_eq!(sch.module().funcs()[0].attr(AUTO_UNROLL_ATTR), Some(64));
        assert!(matches!(sch.annotate_unroll("missing", 64), Err(Error::FuncNotFound { .. })));
    }

    #[test]
    fn test_deep_copy_forks_rng() {
        let mut sch = matmul_schedule();
        let mut copy = sch.deep_copy();
        assert_eq!(sch.structural_hash(), copy.structural_hash());

        copy.parallel("i").unwrap();
        assert_ne!(sch.structural_hash(), copy.structural_hash());
        assert_ne!(sch.rng_mut().state(), copy.rng_mut().state());
    }

    #[test]
    fn test_split_then_reorder_tiling_shape() {
        let mut sch = matmul_schedule();
        sch.split("i", &[8, 8]).unwrap();
        sch.split("j", &[8, 8]).unwrap();
        sch.reorder(&["i.0", "j.0", "i.1", "j.1"]).unwrap();

        let func = &sch.module().funcs()[0];
        let mut vars = Vec::new();
        let mut cur = func.root();
        loop {
            match func.node(cur) {
                ExprNode::Loop { var, body, .. } => {
                    vars.push(var.clone());
                    cur = *body;
                }
                _ => break,
            }
        }
        assert_eq!(vars, vec!["i.0", "j.0", "i.1", "j.1", "k"]);
    }
}
