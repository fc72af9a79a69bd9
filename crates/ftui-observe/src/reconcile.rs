#![forbid(unsafe_code)]

//! Minimal-move reconciliation of ordered projections.
//!
//! A view that projects one unit per collection element (rows, child
//! widgets, ...) uses the [`IndexMap`] of a collection change to decide what
//! to keep, move, create and release. Surviving elements form a permutation
//! of their prior indices; the longest increasing subsequence of that
//! permutation is the largest set of units that can stay where they are.
//! Every other survivor moves, created positions get fresh units, deleted
//! prior indices release theirs.
//!
//! # Complexity
//!
//! O(n log n) in the collection size. Scratch buffers only grow and are
//! reused across calls, since reconciliation runs on every flush.
//!
//! # Example
//!
//! ```
//! use ftui_observe::index_map::{IndexEntry, IndexMap};
//! use ftui_observe::reconcile::Reconciler;
//!
//! // [c, new, a, b] from [a, b, c]
//! let map = IndexMap::from_parts(
//!     vec![IndexEntry::Prior(2), IndexEntry::Created, IndexEntry::Prior(0), IndexEntry::Prior(1)],
//!     vec![],
//! );
//! let mut reconciler = Reconciler::new();
//! let plan = reconciler.plan(&map);
//! assert_eq!(plan.moves.len(), 1);
//! assert_eq!(plan.stable, vec![2, 3]);
//! assert_eq!(plan.inserts, vec![1]);
//! ```

use crate::index_map::{IndexEntry, IndexMap};

const NO_PREDECESSOR: usize = usize::MAX;

/// One relocated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Prior index of the unit.
    pub from: usize,
    /// Its new position.
    pub to: usize,
}

/// What a projection must do to follow one collection change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// New positions whose unit stays in place, ascending.
    pub stable: Vec<usize>,
    /// Units that relocate, in new-position order.
    pub moves: Vec<Move>,
    /// New positions that need a fresh unit, ascending.
    pub inserts: Vec<usize>,
    /// Prior indices whose unit is released.
    pub removals: Vec<usize>,
}

impl ReconcilePlan {
    /// Nothing moves, nothing is created or released.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.moves.is_empty() && self.inserts.is_empty() && self.removals.is_empty()
    }
}

/// LIS-based reconciler with reusable scratch space.
#[derive(Debug, Default)]
pub struct Reconciler {
    positions: Vec<usize>,
    priors: Vec<usize>,
    tails: Vec<usize>,
    predecessors: Vec<usize>,
    lis: Vec<usize>,
    keep: Vec<bool>,
}

impl Reconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current scratch capacity (elements), for monitoring reuse.
    #[must_use]
    pub fn scratch_capacity(&self) -> usize {
        self.positions.capacity()
    }

    /// Split survivors into stable positions and moves.
    fn solve(&mut self, map: &IndexMap) {
        self.positions.clear();
        self.priors.clear();
        for (position, entry) in map.entries().iter().enumerate() {
            if let IndexEntry::Prior(prior) = entry {
                self.positions.push(position);
                self.priors.push(*prior);
            }
        }
        lis_into(
            &self.priors,
            &mut self.tails,
            &mut self.predecessors,
            &mut self.lis,
        );
        self.keep.clear();
        self.keep.resize(self.priors.len(), false);
        for &i in &self.lis {
            self.keep[i] = true;
        }
    }

    /// Plan the minimal set of moves for `map`.
    pub fn plan(&mut self, map: &IndexMap) -> ReconcilePlan {
        let mut plan = ReconcilePlan {
            removals: map.deleted_indices().to_vec(),
            ..ReconcilePlan::default()
        };
        if map.is_empty() {
            return plan;
        }
        self.solve(map);
        for (i, (&position, &prior)) in self.positions.iter().zip(&self.priors).enumerate() {
            if self.keep[i] {
                plan.stable.push(position);
            } else {
                plan.moves.push(Move {
                    from: prior,
                    to: position,
                });
            }
        }
        plan.inserts.extend(
            map.entries()
                .iter()
                .enumerate()
                .filter(|(_, entry)| **entry == IndexEntry::Created)
                .map(|(position, _)| position),
        );
        plan
    }

    /// Reorder `units` (one per prior element) to follow `map`.
    ///
    /// Created positions get `create(position)`; units of deleted elements,
    /// and any unit the map does not account for, go to `release`. A map
    /// that references a missing prior unit gets a fresh unit there.
    pub fn apply<U>(
        &mut self,
        units: Vec<U>,
        map: &IndexMap,
        mut create: impl FnMut(usize) -> U,
        mut release: impl FnMut(U),
    ) -> Vec<U> {
        let mut prior: Vec<Option<U>> = units.into_iter().map(Some).collect();
        for &index in map.deleted_indices() {
            if let Some(unit) = prior.get_mut(index).and_then(Option::take) {
                release(unit);
            }
        }
        let next: Vec<U> = map
            .entries()
            .iter()
            .enumerate()
            .map(|(position, entry)| match entry {
                IndexEntry::Prior(index) => prior
                    .get_mut(*index)
                    .and_then(Option::take)
                    .unwrap_or_else(|| create(position)),
                IndexEntry::Created => create(position),
            })
            .collect();
        for unit in prior.into_iter().flatten() {
            release(unit);
        }
        next
    }
}

/// Indices into `values` of one longest strictly increasing subsequence.
#[must_use]
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    let mut tails = Vec::new();
    let mut predecessors = Vec::new();
    let mut out = Vec::new();
    lis_into(values, &mut tails, &mut predecessors, &mut out);
    out
}

fn lis_into(
    values: &[usize],
    tails: &mut Vec<usize>,
    predecessors: &mut Vec<usize>,
    out: &mut Vec<usize>,
) {
    tails.clear();
    predecessors.clear();
    out.clear();
    predecessors.resize(values.len(), NO_PREDECESSOR);

    for (i, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&t| values[t] < value);
        if slot > 0 {
            predecessors[i] = tails[slot - 1];
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut cursor = tails.last().copied().unwrap_or(NO_PREDECESSOR);
    while cursor != NO_PREDECESSOR {
        out.push(cursor);
        cursor = predecessors[cursor];
    }
    out.reverse();
}
