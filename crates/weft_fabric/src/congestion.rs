//! Shared congestion state negotiated across routing iterations.
//!
//! Occupancy is the number of nets currently using each RR node; it is
//! updated atomically by whichever worker routes or rips up a net. The
//! accumulated history cost grows at iteration boundaries for every
//! overused node, and only the iteration controller mutates it. The present
//! congestion penalty is derived on the fly from occupancy and the current
//! `pres_fac`.

use crate::rr::RrGraph;
use std::sync::atomic::{AtomicU32, Ordering};
use weft_common::RrNodeId;

/// A summary of overuse at the end of a routing iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OveruseInfo {
    /// Number of RR nodes whose occupancy exceeds their capacity.
    pub overused_nodes: usize,
    /// Sum of `occupancy - capacity` over all overused nodes.
    pub total_overuse: u64,
    /// Number of RR nodes in the graph.
    pub num_nodes: usize,
}

impl OveruseInfo {
    /// Overused nodes as a percentage of the graph.
    pub fn overused_pct(&self) -> f32 {
        if self.num_nodes == 0 {
            0.0
        } else {
            100.0 * self.overused_nodes as f32 / self.num_nodes as f32
        }
    }
}

/// Per-node occupancy and history costs for negotiated congestion routing.
#[derive(Debug)]
pub struct CongestionCosts {
    occ: Vec<AtomicU32>,
    acc_cost: Vec<f32>,
}

impl CongestionCosts {
    /// Creates congestion state for a graph with `num_nodes` nodes.
    ///
    /// History costs start at 1.0 so they multiply into node costs
    /// neutrally.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            occ: (0..num_nodes).map(|_| AtomicU32::new(0)).collect(),
            acc_cost: vec![1.0; num_nodes],
        }
    }

    /// The number of nets currently occupying a node.
    pub fn occupancy(&self, node: RrNodeId) -> u32 {
        self.occ[node.index()].load(Ordering::Relaxed)
    }

    /// Records one more net using a node.
    pub fn add_use(&self, node: RrNodeId) {
        self.occ[node.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Records one fewer net using a node.
    pub fn remove_use(&self, node: RrNodeId) {
        let prev = self.occ[node.index()].fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "occupancy underflow on node {node}");
    }

    /// The accumulated history cost of a node.
    pub fn acc_cost(&self, node: RrNodeId) -> f32 {
        self.acc_cost[node.index()]
    }

    /// The present congestion penalty for routing one more net through a
    /// node under the given `pres_fac`.
    ///
    /// 1.0 when the node has free capacity; otherwise grows linearly with
    /// the overuse the additional net would cause.
    pub fn present_cost(&self, rr: &RrGraph, node: RrNodeId, pres_fac: f32) -> f32 {
        let occ = self.occupancy(node) + 1;
        let cap = rr.capacity(node);
        if occ > cap {
            1.0 + (occ - cap) as f32 * pres_fac
        } else {
            1.0
        }
    }

    /// The full congestion-weighted cost of expanding into a node.
    pub fn node_cost(&self, rr: &RrGraph, node: RrNodeId, pres_fac: f32) -> f32 {
        rr.base_cost(node) * self.acc_cost(node) * self.present_cost(rr, node, pres_fac)
    }

    /// Grows history costs for every overused node and returns the overuse
    /// summary. Called once per iteration by the controller; `acc_fac` is
    /// zero on the first iteration.
    pub fn update_acc_costs(&mut self, rr: &RrGraph, acc_fac: f32) -> OveruseInfo {
        let mut info = OveruseInfo {
            num_nodes: self.occ.len(),
            ..OveruseInfo::default()
        };
        for i in 0..self.occ.len() {
            let node = RrNodeId::from_raw(i as u32);
            let occ = self.occupancy(node);
            let cap = rr.capacity(node);
            if occ > cap {
                let overuse = occ - cap;
                info.overused_nodes += 1;
                info.total_overuse += overuse as u64;
                self.acc_cost[i] += overuse as f32 * acc_fac;
            }
        }
        info
    }

    /// Read-only overuse summary without touching history costs.
    pub fn overuse_info(&self, rr: &RrGraph) -> OveruseInfo {
        let mut info = OveruseInfo {
            num_nodes: self.occ.len(),
            ..OveruseInfo::default()
        };
        for i in 0..self.occ.len() {
            let node = RrNodeId::from_raw(i as u32);
            let occ = self.occupancy(node);
            let cap = rr.capacity(node);
            if occ > cap {
                info.overused_nodes += 1;
                info.total_overuse += (occ - cap) as u64;
            }
        }
        info
    }

    /// Whether no node is overused.
    pub fn is_feasible(&self, rr: &RrGraph) -> bool {
        self.overuse_info(rr).overused_nodes == 0
    }

    /// Total wirelength in use: the sum of all node occupancies.
    pub fn used_wirelength(&self) -> u64 {
        self.occ
            .iter()
            .map(|o| o.load(Ordering::Relaxed) as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::DeviceGrid;

    fn setup() -> (RrGraph, CongestionCosts) {
        let rr = RrGraph::mesh(DeviceGrid::new(4, 4).unwrap(), 1);
        let costs = CongestionCosts::new(rr.num_nodes());
        (rr, costs)
    }

    #[test]
    fn single_use_is_free() {
        let (rr, costs) = setup();
        let n = rr.node_at(1, 1);
        costs.add_use(n);
        assert_eq!(costs.occupancy(n), 1);
        assert!(costs.is_feasible(&rr));
        // The *next* net through this node would overuse it.
        assert!(costs.present_cost(&rr, n, 0.5) > 1.0);
    }

    #[test]
    fn double_use_causes_overuse() {
        let (rr, costs) = setup();
        let n = rr.node_at(2, 2);
        costs.add_use(n);
        costs.add_use(n);
        let info = costs.overuse_info(&rr);
        assert_eq!(info.overused_nodes, 1);
        assert_eq!(info.total_overuse, 1);
        assert!(!costs.is_feasible(&rr));
    }

    #[test]
    fn remove_use_resolves_overuse() {
        let (rr, costs) = setup();
        let n = rr.node_at(0, 0);
        costs.add_use(n);
        costs.add_use(n);
        costs.remove_use(n);
        assert!(costs.is_feasible(&rr));
    }

    #[test]
    fn history_accumulates() {
        let (rr, mut costs) = setup();
        let n = rr.node_at(3, 3);
        costs.add_use(n);
        costs.add_use(n);
        costs.update_acc_costs(&rr, 1.0);
        let cost_after_1 = costs.node_cost(&rr, n, 0.0);
        costs.update_acc_costs(&rr, 1.0);
        let cost_after_2 = costs.node_cost(&rr, n, 0.0);
        assert!(cost_after_2 > cost_after_1);
        assert!(cost_after_1 > 1.0);
    }

    #[test]
    fn zero_acc_fac_keeps_history_flat() {
        let (rr, mut costs) = setup();
        let n = rr.node_at(1, 0);
        costs.add_use(n);
        costs.add_use(n);
        let info = costs.update_acc_costs(&rr, 0.0);
        assert_eq!(info.overused_nodes, 1);
        assert_eq!(costs.acc_cost(n), 1.0);
    }

    #[test]
    fn present_cost_scales_with_pres_fac() {
        let (rr, costs) = setup();
        let n = rr.node_at(1, 2);
        costs.add_use(n);
        let low = costs.present_cost(&rr, n, 0.5);
        let high = costs.present_cost(&rr, n, 2.0);
        assert!(high > low);
    }

    #[test]
    fn wirelength_counts_all_uses() {
        let (rr, costs) = setup();
        costs.add_use(rr.node_at(0, 0));
        costs.add_use(rr.node_at(0, 1));
        costs.add_use(rr.node_at(0, 1));
        assert_eq!(costs.used_wirelength(), 3);
    }

    #[test]
    fn overused_pct() {
        let info = OveruseInfo {
            overused_nodes: 2,
            total_overuse: 3,
            num_nodes: 16,
        };
        assert!((info.overused_pct() - 12.5).abs() < 1e-6);
    }
}
