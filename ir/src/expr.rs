//! Arena-backed schedulable IR.
//!
//! A [`Module`] is the post-lowering, pre-scheduled form of a task: one
//! [`FuncExpr`] per lowered function. Each function owns an index arena of
//! [`ExprNode`]s; handles are plain indices, so a deep copy is a clone of the
//! arena with no aliasing between copies.
//!
//! Loops and blocks are addressed by stable string identifiers. Builders keep
//! identifiers unique within a module; schedule primitives derive new
//! identifiers deterministically (`i` splits into `i.0`, `i.1`, ...), which
//! keeps replayed traces addressable.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Index of a node within a [`FuncExpr`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprRef(u32);

impl ExprRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// GPU thread axis a loop can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadAxis {
    BlockX,
    BlockY,
    ThreadX,
    ThreadY,
}

impl fmt::Display for ThreadAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockX => write!(f, "blockIdx.x"),
            Self::BlockY => write!(f, "blockIdx.y"),
            Self::ThreadX => write!(f, "threadIdx.x"),
            Self::ThreadY => write!(f, "threadIdx.y"),
        }
    }
}

/// Execution kind of a loop.
///
/// Freshly lowered loops are always [`LoopKind::Serial`]; schedule primitives
/// move them to one of the annotated kinds, at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoopKind {
    #[default]
    Serial,
    /// Multi-core parallel loop.
    Parallel,
    /// SIMD lanes; only valid on an innermost loop.
    Vectorize,
    /// Fully unrolled loop.
    Unroll,
    /// Bound to a GPU thread axis.
    Bound(ThreadAxis),
}

/// A single node in a function expression arena.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    /// Loop over `[0, extent)` binding `var` around `body`.
    Loop { var: String, extent: i64, kind: LoopKind, body: ExprRef },
    /// Ordered statement sequence.
    Seq { stmts: SmallVec<[ExprRef; 2]> },
    /// Leaf computation writing the named block's buffer.
    ///
    /// `trivial` marks elementwise blocks that may be inlined into their
    /// consumer; `inlined` records that the inlining happened.
    Compute { name: String, trivial: bool, inlined: bool },
}

/// One function of a module: an arena of nodes plus the root statement.
///
/// Transformed in place by schedule primitives; nodes orphaned by a
/// transformation stay in the arena but are unreachable from the root and do
/// not participate in traversal or hashing.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncExpr {
    name: String,
    nodes: Vec<ExprNode>,
    root: ExprRef,
    /// Function-level scheduling annotations, kept sorted by key.
    attrs: SmallVec<[(String, i64); 2]>,
}

impl FuncExpr {
    /// Start building a function expression.
    pub fn builder(name: &str) -> FuncExprBuilder {
        FuncExprBuilder { name: name.to_owned(), nodes: Vec::new(), stages: Vec::new() }
    }

    /// Convenience: a function whose body is a single perfect loop nest
    /// around one non-trivial compute block.
    pub fn loop_nest(name: &str, loops: &[(&str, i64)], block: &str) -> Self {
        Self::builder(name).nest(loops, block).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> ExprRef {
        self.root
    }

    pub fn node(&self, r: ExprRef) -> &ExprNode {
        &self.nodes[r.index()]
    }

    pub(crate) fn node_mut(&mut self, r: ExprRef) -> &mut ExprNode {
        &mut self.nodes[r.index()]
    }

    pub(crate) fn push(&mut self, node: ExprNode) -> ExprRef {
        let r = ExprRef(self.nodes.len() as u32);
        self.nodes.push(node);
        r
    }

    /// Set (or overwrite) a function-level annotation.
    pub fn set_attr(&mut self, key: &str, value: i64) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => {
                self.attrs.push((key.to_owned(), value));
                self.attrs.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }
    }

    pub fn attr(&self, key: &str) -> Option<i64> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn attrs(&self) -> &[(String, i64)] {
        &self.attrs
    }

    /// All loops reachable from the root, in preorder.
    pub fn loops(&self) -> Vec<ExprRef> {
        let mut out = Vec::new();
        self.collect(self.root, &mut |f, r| {
            if matches!(f.node(r), ExprNode::Loop { .. }) {
                out.push(r);
            }
        });
        out
    }

    /// All compute blocks reachable from the root, in preorder.
    pub fn computes(&self) -> Vec<ExprRef> {
        let mut out = Vec::new();
        self.collect(self.root, &mut |f, r| {
            if matches!(f.node(r), ExprNode::Compute { .. }) {
                out.push(r);
            }
        });
        out
    }

    pub fn find_loop(&self, var: &str) -> Option<ExprRef> {
        self.loops().into_iter().find(|&r| matches!(self.node(r), ExprNode::Loop { var: v, .. } if v == var))
    }

    pub fn find_compute(&self, name: &str) -> Option<ExprRef> {
        self.computes().into_iter().find(|&r| matches!(self.node(r), ExprNode::Compute { name: n, .. } if n == name))
    }

    /// Parent of a live node, or `None` for the root. Orphaned arena nodes
    /// are never visited, so stale references in them cannot shadow the live
    /// tree.
    pub fn parent_of(&self, target: ExprRef) -> Option<ExprRef> {
        if target == self.root {
            return None;
        }
        let mut found = None;
        self.collect(self.root, &mut |f, r| {
            if found.is_some() {
                return;
            }
            let hit = match f.node(r) {
                ExprNode::Loop { body, .. } => *body == target,
                ExprNode::Seq { stmts } => stmts.contains(&target),
                ExprNode::Compute { .. } => false,
            };
            if hit {
                found = Some(r);
            }
        });
        found
    }

    /// Rewire the live edge pointing at `old` to point at `new`.
    pub(crate) fn replace_child(&mut self, old: ExprRef, new: ExprRef) {
        if old == self.root {
            self.root = new;
            return;
        }
        if let Some(parent) = self.parent_of(old) {
            match self.node_mut(parent) {
                ExprNode::Loop { body, .. } => *body = new,
                ExprNode::Seq { stmts } => {
                    for slot in stmts.iter_mut() {
                        if *slot == old {
                            *slot = new;
                        }
                    }
                }
                ExprNode::Compute { .. } => {}
            }
        }
    }

    fn collect(&self, r: ExprRef, visit: &mut impl FnMut(&Self, ExprRef)) {
        visit(self, r);
        match self.node(r) {
            ExprNode::Loop { body, .. } => self.collect(*body, visit),
            ExprNode::Seq { stmts } => {
                for &s in stmts {
                    self.collect(s, visit);
                }
            }
            ExprNode::Compute { .. } => {}
        }
    }

    /// Structural hash of the live tree.
    ///
    /// Invariant under loop-variable renaming (identifier regeneration) and
    /// under orphaned arena nodes; sensitive to extents, loop kinds, block
    /// identity, inlining state, and annotations.
    pub fn structural_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.name.hash(&mut h);
        for (k, v) in &self.attrs {
            k.hash(&mut h);
            v.hash(&mut h);
        }
        self.hash_node(self.root, &mut h);
        h.finish()
    }

    fn hash_node(&self, r: ExprRef, h: &mut DefaultHasher) {
        match self.node(r) {
            ExprNode::Loop { extent, kind, body, .. } => {
                0u8.hash(h);
                extent.hash(h);
                kind.hash(h);
                self.hash_node(*body, h);
            }
            ExprNode::Seq { stmts } => {
                1u8.hash(h);
                stmts.len().hash(h);
                for &s in stmts {
                    self.hash_node(s, h);
                }
            }
            ExprNode::Compute { name, trivial, inlined } => {
                2u8.hash(h);
                name.hash(h);
                trivial.hash(h);
                inlined.hash(h);
            }
        }
    }

    fn fmt_node(&self, r: ExprRef, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self.node(r) {
            ExprNode::Loop { var, extent, kind, body } => {
                let tag = match kind {
                    LoopKind::Serial => String::new(),
                    LoopKind::Parallel => " parallel".to_owned(),
                    LoopKind::Vectorize => " vectorize".to_owned(),
                    LoopKind::Unroll => " unroll".to_owned(),
                    LoopKind::Bound(axis) => format!(" bind[{axis}]"),
                };
                writeln!(f, "{pad}for {var} in 0..{extent}{tag} {{")?;
                self.fmt_node(*body, indent + 1, f)?;
                writeln!(f, "{pad}}}")
            }
            ExprNode::Seq { stmts } => {
                for &s in stmts {
                    self.fmt_node(s, indent, f)?;
                }
                Ok(())
            }
            ExprNode::Compute { name, trivial, inlined } => {
                let mark = match (trivial, inlined) {
                    (_, true) => " (inlined)",
                    (true, false) => " (trivial)",
                    (false, false) => "",
                };
                writeln!(f, "{pad}compute {name}{mark}")
            }
        }
    }
}

impl fmt::Display for FuncExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} {{", self.name)?;
        self.fmt_node(self.root, 1, f)?;
        write!(f, "}}")
    }
}

/// Builder for [`FuncExpr`]: a sequence of loop-nest stages.
pub struct FuncExprBuilder {
    name: String,
    nodes: Vec<ExprNode>,
    stages: Vec<ExprRef>,
}

impl FuncExprBuilder {
    /// Add a perfect loop nest (outermost first) around a non-trivial
    /// compute block.
    pub fn nest(self, loops: &[(&str, i64)], block: &str) -> Self {
        self.push_nest(loops, block, false)
    }

    /// Add a perfect loop nest around a trivial (inlinable) compute block.
    pub fn trivial_nest(self, loops: &[(&str, i64)], block: &str) -> Self {
        self.push_nest(loops, block, true)
    }

    fn push_nest(mut self, loops: &[(&str, i64)], block: &str, trivial: bool) -> Self {
        let mut body = self.push(ExprNode::Compute { name: block.to_owned(), trivial, inlined: false });
        for &(var, extent) in loops.iter().rev() {
            body = self.push(ExprNode::Loop { var: var.to_owned(), extent, kind: LoopKind::Serial, body });
        }
        self.stages.push(body);
        self
    }

    fn push(&mut self, node: ExprNode) -> ExprRef {
        let r = ExprRef(self.nodes.len() as u32);
        self.nodes.push(node);
        r
    }

    /// Finish the function.
    ///
    /// # Panics
    ///
    /// Panics if no stage was added; an empty function is not lowerable.
    pub fn build(mut self) -> FuncExpr {
        assert!(!self.stages.is_empty(), "function `{}` has no stages", self.name);
        let root = if self.stages.len() == 1 {
            self.stages[0]
        } else {
            let stmts: SmallVec<[ExprRef; 2]> = self.stages.iter().copied().collect();
            self.push(ExprNode::Seq { stmts })
        };
        FuncExpr { name: self.name, nodes: self.nodes, root, attrs: SmallVec::new() }
    }
}

/// The post-lowering, pre-scheduled IR of a task: one expression per
/// function.
///
/// Loop and block identifiers must be unique module-wide; builders uphold
/// this as long as callers pick distinct names across functions.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    funcs: Vec<FuncExpr>,
}

impl Module {
    pub fn new(funcs: Vec<FuncExpr>) -> Self {
        Self { funcs }
    }

    pub fn funcs(&self) -> &[FuncExpr] {
        &self.funcs
    }

    pub(crate) fn funcs_mut(&mut self) -> &mut [FuncExpr] {
        &mut self.funcs
    }

    pub fn func(&self, name: &str) -> Option<&FuncExpr> {
        self.funcs.iter().find(|f| f.name() == name)
    }

    /// True structural copy: no node is shared with the original.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Order-sensitive combination of the member function hashes.
    pub fn structural_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.funcs.len().hash(&mut h);
        for f in &self.funcs {
            f.structural_hash().hash(&mut h);
        }
        h.finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.funcs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
