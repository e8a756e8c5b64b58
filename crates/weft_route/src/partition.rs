//! The spatial partition tree.
//!
//! The tree divides the device into nested regions so that nets with
//! non-overlapping bounding boxes can be routed in parallel. A branch node
//! carries a cutline and owns only the nets that straddle it; every other
//! net descends to the side its box lies on. A leaf owns whatever remains
//! when no usable cutline exists.
//!
//! Cutline selection follows a prefix-sum load model: for every candidate
//! position the fanout-weighted amount of routing work on each side is
//! compared, degenerate candidates (all work on one side) are skipped, and
//! the most balanced cut wins, preferring earlier X positions, then
//! earlier Y.

use crate::decompose::VirtualNet;
use weft_common::{Axis, NetId, Side};
use weft_fabric::{Netlist, RouteBbs};

/// One region of the device owned by the partition tree.
#[derive(Debug)]
pub struct PartitionTreeNode {
    /// Nets this node routes itself: the straddlers of its cutline, or all
    /// remaining nets if this is a leaf.
    pub nets: Vec<NetId>,
    /// Virtual halves of decomposed nets pushed down from ancestors.
    pub virtual_nets: Vec<VirtualNet>,
    /// Low-side subtree.
    pub left: Option<Box<PartitionTreeNode>>,
    /// High-side subtree.
    pub right: Option<Box<PartitionTreeNode>>,
    /// Whether every net of this node could be routed (no disconnected
    /// RR graph).
    pub is_routable: bool,
    /// Nets whose routing this node actually changed.
    pub rerouted_nets: Vec<NetId>,
    /// Axis of the cutline, meaningful when `cutline_pos` is set.
    pub cutline_axis: Axis,
    /// Cutline position; the cutline runs at `pos + 0.5`. `None` for a
    /// leaf.
    pub cutline_pos: Option<i32>,
}

impl PartitionTreeNode {
    fn leaf(nets: Vec<NetId>) -> Self {
        Self {
            nets,
            virtual_nets: Vec::new(),
            left: None,
            right: None,
            is_routable: true,
            rerouted_nets: Vec::new(),
            cutline_axis: Axis::X,
            cutline_pos: None,
        }
    }

    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.left.as_ref().map_or(0, |n| n.node_count())
            + self.right.as_ref().map_or(0, |n| n.node_count())
    }

    /// Number of nets owned by this subtree.
    pub fn net_count(&self) -> usize {
        self.nets.len()
            + self.left.as_ref().map_or(0, |n| n.net_count())
            + self.right.as_ref().map_or(0, |n| n.net_count())
    }

    /// Visits every node of this subtree.
    pub fn for_each(&self, f: &mut impl FnMut(&PartitionTreeNode)) {
        f(self);
        if let Some(l) = &self.left {
            l.for_each(f);
        }
        if let Some(r) = &self.right {
            r.for_each(f);
        }
    }
}

/// The partition tree over a netlist. Built fresh for every routing
/// iteration, since bounding boxes move between iterations.
#[derive(Debug)]
pub struct PartitionTree {
    root: Option<Box<PartitionTreeNode>>,
}

impl PartitionTree {
    /// Builds the tree over all nets, partitioning by their current
    /// routing bounding boxes.
    pub fn build(netlist: &Netlist, bbs: &RouteBbs) -> Self {
        let nets: Vec<NetId> = netlist.nets().collect();
        let grid = netlist.grid();
        Self {
            root: build_helper(netlist, bbs, nets, 0, 0, grid.width(), grid.height()),
        }
    }

    /// The root node; `None` for an empty netlist.
    pub fn root(&self) -> Option<&PartitionTreeNode> {
        self.root.as_deref()
    }

    /// Mutable access to the root node.
    pub fn root_mut(&mut self) -> Option<&mut PartitionTreeNode> {
        self.root.as_deref_mut()
    }
}

/// Recursively partitions `nets` within the half-open rectangle
/// `[x1, x2) x [y1, y2)`.
fn build_helper(
    netlist: &Netlist,
    bbs: &RouteBbs,
    nets: Vec<NetId>,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
) -> Option<Box<PartitionTreeNode>> {
    if nets.is_empty() {
        return None;
    }

    let w = (x2 - x1) as usize;
    let h = (y2 - y1) as usize;
    debug_assert!(w > 0 && h > 0, "degenerate partition rectangle");

    // Fanout-weighted prefix sums over the region, rebuilt per level
    // because each cutline takes the straddlers out of play for the
    // children. `before[c]` counts the work of nets whose box has begun by
    // coordinate c; `after[c]` counts nets whose box still extends at c.
    let mut x_before = vec![0u64; w];
    let mut x_after = vec![0u64; w];
    let mut y_before = vec![0u64; h];
    let mut y_after = vec![0u64; h];
    for &net in &nets {
        let bb = bbs.get(net);
        let weight = netlist.net_fanout(net) as u64;

        let x_start = (bb.xmin.max(x1) - x1) as usize;
        let x_end = ((bb.xmax + 1).min(x2) - x1) as usize;
        for slot in &mut x_before[x_start..] {
            *slot += weight;
        }
        for slot in &mut x_after[..x_end] {
            *slot += weight;
        }

        let y_start = (bb.ymin.max(y1) - y1) as usize;
        let y_end = ((bb.ymax + 1).min(y2) - y1) as usize;
        for slot in &mut y_before[y_start..] {
            *slot += weight;
        }
        for slot in &mut y_after[..y_end] {
            *slot += weight;
        }
    }

    let total = x_before[w - 1];
    let mut best: Option<(u64, Axis, i32)> = None;

    // A candidate cut at c sits at c + 0.5. It is degenerate when no net
    // lies entirely at coordinates <= c (everything still extends past the
    // cut) or none lies entirely above it (everything has already begun).
    let mut consider = |axis: Axis, len: usize, before: &[u64], after: &[u64], origin: i32| {
        for c in 0..len {
            let nothing_low = c + 1 < len && after[c + 1] == total;
            let nothing_high = before[c] == total;
            if nothing_low || nothing_high || c + 1 == len {
                continue;
            }
            let score = before[c].abs_diff(after[c]);
            if best.map_or(true, |(s, _, _)| score < s) {
                best = Some((score, axis, origin + c as i32));
            }
        }
    };
    consider(Axis::X, w, &x_before, &x_after, x1);
    consider(Axis::Y, h, &y_before, &y_after, y1);

    let Some((_, axis, pos)) = best else {
        // Every cutline is one-way: this region routes serially.
        return Some(Box::new(PartitionTreeNode::leaf(nets)));
    };

    let mut low_nets = Vec::new();
    let mut high_nets = Vec::new();
    let mut my_nets = Vec::new();
    for &net in &nets {
        match bbs.get(net).side_of_cutline(axis, pos) {
            Some(Side::Low) => low_nets.push(net),
            Some(Side::High) => high_nets.push(net),
            None => my_nets.push(net),
        }
    }

    let (left, right) = match axis {
        Axis::X => (
            build_helper(netlist, bbs, low_nets, x1, y1, pos + 1, y2),
            build_helper(netlist, bbs, high_nets, pos + 1, y1, x2, y2),
        ),
        Axis::Y => (
            build_helper(netlist, bbs, low_nets, x1, y1, x2, pos + 1),
            build_helper(netlist, bbs, high_nets, x1, pos + 1, x2, y2),
        ),
    };
    debug_assert!(
        left.is_some() && right.is_some(),
        "non-degenerate cutline must populate both sides"
    );

    Some(Box::new(PartitionTreeNode {
        nets: my_nets,
        virtual_nets: Vec::new(),
        left,
        right,
        is_routable: true,
        rerouted_nets: Vec::new(),
        cutline_axis: axis,
        cutline_pos: Some(pos),
    }))
}
