//! Search states and the containers that manage them across generations.

use std::cell::OnceCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use kuzna_ir::IrSchedule;

/// A schedule candidate paired with its predicted cost.
///
/// Shared-ownership wrapper: clones are cheap and refer to the same
/// immutable schedule. Identity (hash and equality) is the structural hash
/// of the schedule the candidate's trace replays into - the normalized form
/// of its descriptor - so two traces that produce the same module are one
/// candidate, and crossover children with empty traces still get distinct
/// identities.
#[derive(Debug, Clone)]
pub struct SearchState {
    schedule: Arc<IrSchedule>,
    /// Predicted cost; NaN = not yet scored.
    cost: f64,
    /// Cached structural hash, computed on first use. The OnceCell makes
    /// states !Sync; a session's states stay on its thread.
    hash: OnceCell<u64>,
}

impl SearchState {
    /// Wrap an unscored schedule.
    pub fn new(schedule: IrSchedule) -> Self {
        Self::with_cost(schedule, f64::NAN)
    }

    /// Wrap a schedule with a known cost (e.g. loaded from the database).
    pub fn with_cost(schedule: IrSchedule, cost: f64) -> Self {
        Self { schedule: Arc::new(schedule), cost, hash: OnceCell::new() }
    }

    pub fn schedule(&self) -> &IrSchedule {
        &self.schedule
    }

    pub fn predicted_cost(&self) -> f64 {
        self.cost
    }

    pub fn is_scored(&self) -> bool {
        !self.cost.is_nan()
    }

    pub fn structural_hash(&self) -> u64 {
        *self.hash.get_or_init(|| self.schedule.structural_hash())
    }

    /// Same schedule, new cost. Shares the underlying schedule and any
    /// already-computed hash.
    pub fn rescored(&self, cost: f64) -> Self {
        Self { schedule: Arc::clone(&self.schedule), cost, hash: self.hash.clone() }
    }
}

impl PartialEq for SearchState {
    fn eq(&self, other: &Self) -> bool {
        self.structural_hash() == other.structural_hash()
    }
}

impl Eq for SearchState {}

impl Hash for SearchState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.structural_hash().hash(state);
    }
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SearchState(cost={}, hash={:016x}, steps={})",
            self.cost,
            self.structural_hash(),
            self.schedule.trace().len()
        )
    }
}

/// Total-order key for predicted costs; NaN sorts last.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedCost(f64);

impl Eq for OrderedCost {}

impl PartialOrd for OrderedCost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedCost {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Fixed-capacity multiset of the lowest-cost states seen.
///
/// Keys are `(cost, insertion sequence)`, so ties are broken by insertion
/// order and eviction is deterministic. O(log K) per insertion.
#[derive(Debug)]
pub struct BoundedBestSet {
    capacity: usize,
    seq: u64,
    items: BTreeMap<(OrderedCost, u64), SearchState>,
}

impl BoundedBestSet {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, seq: 0, items: BTreeMap::new() }
    }

    /// Insert a state, evicting the current worst if over capacity.
    pub fn push(&mut self, state: SearchState) {
        if self.capacity == 0 {
            return;
        }
        let key = (OrderedCost(state.predicted_cost()), self.seq);
        self.seq += 1;
        self.items.insert(key, state);
        if self.items.len() > self.capacity {
            self.items.pop_last();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drain into an ordered list, best first.
    pub fn into_sorted_vec(self) -> Vec<SearchState> {
        self.items.into_values().collect()
    }
}

/// Insert-only record of every candidate identity returned during a search
/// session.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: HashSet<u64>,
}

impl VisitedSet {
    pub fn contains(&self, state: &SearchState) -> bool {
        self.seen.contains(&state.structural_hash())
    }

    /// Record a candidate; returns `false` if it was already present.
    pub fn insert(&mut self, state: &SearchState) -> bool {
        self.seen.insert(state.structural_hash())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
