//! The per-connection maze router and its heap implementations.
//!
//! [`MazeRouter`] expands a congestion- and criticality-weighted A*
//! wavefront from every route-tree node inside the caller's bounding box to
//! a single sink. The bounding box is a hard frontier: nodes outside it are
//! never expanded, which is what lets disjoint partition-tree tasks touch
//! disjoint slices of the shared congestion state.
//!
//! The heap behind the search is chosen at startup: an exact binary
//! min-heap, or a bucketed approximation that trades strict cost ordering
//! for cheaper pushes.

use crate::stats::RouterStats;
use crate::timing::DelayBudget;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use weft_common::{Bounds, RrNodeId};
use weft_fabric::{CongestionCosts, RrGraph};

/// Cost parameters for routing one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnCostParams {
    /// Criticality of this connection in `[0, 1]`; weights delay against
    /// congestion cost.
    pub criticality: f32,
    /// Weight of the distance-to-target estimate.
    pub astar_fac: f32,
    /// Present congestion penalty factor.
    pub pres_fac: f32,
    /// Optional delay window when hold budgets are active.
    pub delay_budget: Option<DelayBudget>,
}

/// A priority queue of `(cost, node)` pairs popped in (approximately)
/// ascending cost order.
pub trait RouterHeap: Default + Send {
    /// Pushes a node with the given priority.
    fn push(&mut self, cost: f32, node: RrNodeId);
    /// Pops the (approximately) cheapest node.
    fn pop(&mut self) -> Option<(f32, RrNodeId)>;
    /// Removes all entries.
    fn clear(&mut self);
}

#[derive(Debug, Clone)]
struct HeapEntry {
    cost: f32,
    node: RrNodeId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for a min-heap (BinaryHeap is a max-heap).
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An exact binary min-heap.
#[derive(Debug, Default)]
pub struct BinaryHeapQueue {
    heap: BinaryHeap<HeapEntry>,
}

impl RouterHeap for BinaryHeapQueue {
    fn push(&mut self, cost: f32, node: RrNodeId) {
        self.heap.push(HeapEntry { cost, node });
    }

    fn pop(&mut self) -> Option<(f32, RrNodeId)> {
        self.heap.pop().map(|e| (e.cost, e.node))
    }

    fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Bucket width of the approximate heap, in cost units.
const BUCKET_GRANULARITY: f32 = 0.5;
/// Number of buckets; costs past the end share the last bucket.
const NUM_BUCKETS: usize = 4096;

/// An approximate heap that buckets entries by cost.
///
/// Entries within one bucket pop in LIFO order, so ordering is only exact
/// to [`BUCKET_GRANULARITY`]. Matches the original's bucket-heap
/// approximation trade-off.
#[derive(Debug)]
pub struct BucketQueue {
    buckets: Vec<Vec<(f32, RrNodeId)>>,
    first: usize,
    len: usize,
}

impl Default for BucketQueue {
    fn default() -> Self {
        Self {
            buckets: (0..NUM_BUCKETS).map(|_| Vec::new()).collect(),
            first: NUM_BUCKETS,
            len: 0,
        }
    }
}

impl RouterHeap for BucketQueue {
    fn push(&mut self, cost: f32, node: RrNodeId) {
        let bucket = ((cost.max(0.0) / BUCKET_GRANULARITY) as usize).min(NUM_BUCKETS - 1);
        self.buckets[bucket].push((cost, node));
        self.first = self.first.min(bucket);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<(f32, RrNodeId)> {
        if self.len == 0 {
            return None;
        }
        while self.first < NUM_BUCKETS && self.buckets[self.first].is_empty() {
            self.first += 1;
        }
        let entry = self.buckets[self.first].pop()?;
        self.len -= 1;
        Some(entry)
    }

    fn clear(&mut self) {
        for b in &mut self.buckets {
            b.clear();
        }
        self.first = NUM_BUCKETS;
        self.len = 0;
    }
}

/// A maze expander routing single connections inside a bounding box.
///
/// One instance lives in each worker's thread-local slot; the search
/// buffers are reused across connections.
#[derive(Debug, Default)]
pub struct MazeRouter<H: RouterHeap> {
    heap: H,
    best_cost: HashMap<RrNodeId, f32>,
    came_from: HashMap<RrNodeId, RrNodeId>,
    closed: HashSet<RrNodeId>,
}

impl<H: RouterHeap> MazeRouter<H> {
    /// Searches for the cheapest path from any seed to `target`, expanding
    /// only nodes inside `bb`.
    ///
    /// Seeds are `(node, source_delay)` pairs taken from the net's route
    /// tree; their starting cost is the criticality-weighted delay already
    /// spent reaching them, which biases critical connections toward short
    /// continuations of the existing tree.
    ///
    /// Returns the path in seed-to-target order (the first element is a
    /// seed), or `None` when the target is unreachable inside `bb`.
    pub fn route_sink(
        &mut self,
        rr: &RrGraph,
        congestion: &CongestionCosts,
        params: &ConnCostParams,
        bb: &Bounds,
        seeds: &[(RrNodeId, f32)],
        target: RrNodeId,
        stats: &mut RouterStats,
    ) -> Option<Vec<RrNodeId>> {
        if !rr.inside_bb(target, bb) {
            return None;
        }

        self.heap.clear();
        self.best_cost.clear();
        self.came_from.clear();
        self.closed.clear();

        let tx = rr.node_xlow(target);
        let ty = rr.node_ylow(target);
        let estimate = |node: RrNodeId| -> f32 {
            let dist = (rr.node_xlow(node) - tx).abs() + (rr.node_ylow(node) - ty).abs();
            params.astar_fac * dist as f32
        };

        for &(node, delay) in seeds {
            if node == target {
                return Some(vec![node]);
            }
            if !rr.inside_bb(node, bb) {
                continue;
            }
            let g = params.criticality * delay;
            if g < *self.best_cost.get(&node).unwrap_or(&f32::INFINITY) {
                self.best_cost.insert(node, g);
                self.heap.push(g + estimate(node), node);
                stats.heap_pushes += 1;
            }
        }

        while let Some((_, node)) = self.heap.pop() {
            stats.heap_pops += 1;
            if !self.closed.insert(node) {
                continue;
            }
            if node == target {
                return Some(self.backtrace(target));
            }
            let g = self.best_cost[&node];
            for next in rr.neighbors(node) {
                if rr.capacity(next) == 0 {
                    continue;
                }
                if !rr.inside_bb(next, bb) {
                    continue;
                }
                if self.closed.contains(&next) {
                    continue;
                }
                let delay_cost = rr.base_cost(next);
                let cong_cost = congestion.node_cost(rr, next, params.pres_fac);
                let mut g_next = g
                    + params.criticality * delay_cost
                    + (1.0 - params.criticality) * cong_cost;
                if let Some(budget) = params.delay_budget {
                    // RCV-style short-path penalty, with accumulated cost
                    // standing in for delay.
                    if g_next < budget.min_delay {
                        g_next += (budget.min_delay - g_next) * budget.short_path_criticality;
                    }
                }
                if g_next < *self.best_cost.get(&next).unwrap_or(&f32::INFINITY) {
                    self.best_cost.insert(next, g_next);
                    self.came_from.insert(next, node);
                    self.heap.push(g_next + estimate(next), next);
                    stats.heap_pushes += 1;
                }
            }
        }

        None
    }

    fn backtrace(&self, target: RrNodeId) -> Vec<RrNodeId> {
        let mut path = vec![target];
        let mut current = target;
        while let Some(&prev) = self.came_from.get(&current) {
            path.push(prev);
            current = prev;
        }
        path.reverse();
        path
    }
}
