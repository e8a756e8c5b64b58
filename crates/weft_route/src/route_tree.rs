//! Per-net route trees.
//!
//! A [`RouteTree`] is the evolving partial routing of one net: a tree of RR
//! nodes rooted at the source terminal, with the cumulative delay to each
//! node and the set of sinks reached so far. Trees are stored behind per-net
//! mutexes in [`RouteTrees`]; when a decomposed net's two halves route in
//! parallel they operate on disjoint sink sets, and the shared lock
//! serializes their appends under the common root.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use weft_common::{Bounds, RrNodeId};
use weft_fabric::RrGraph;

/// One node of a route tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtNode {
    /// The RR node occupied at this point of the route.
    pub inode: RrNodeId,
    /// Index of the parent node within the tree, `None` for the root.
    pub parent: Option<usize>,
    /// Cumulative delay from the source to this node.
    pub delay: f32,
}

/// The partial routing of a single net.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTree {
    root: RrNodeId,
    nodes: Vec<RtNode>,
    /// Per-sink delay, `None` while a sink is still unreached.
    reached: Vec<Option<f32>>,
    #[serde(skip)]
    index: HashMap<RrNodeId, usize>,
}

impl RouteTree {
    /// Creates a tree containing only the source node.
    pub fn single_source(root: RrNodeId, num_sinks: usize) -> Self {
        let mut index = HashMap::new();
        index.insert(root, 0);
        Self {
            root,
            nodes: vec![RtNode {
                inode: root,
                parent: None,
                delay: 0.0,
            }],
            reached: vec![None; num_sinks],
            index,
        }
    }

    /// The RR node at the root (source terminal) of the tree.
    pub fn root(&self) -> RrNodeId {
        self.root
    }

    /// The number of sinks this net has.
    pub fn num_sinks(&self) -> usize {
        self.reached.len()
    }

    /// The number of RR nodes currently in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the tree holds only the root (or nothing was built).
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Whether the tree already uses an RR node.
    pub fn contains(&self, inode: RrNodeId) -> bool {
        self.index.contains_key(&inode)
    }

    /// Cumulative delay from the source to an RR node in the tree.
    pub fn node_delay(&self, inode: RrNodeId) -> Option<f32> {
        self.index.get(&inode).map(|&i| self.nodes[i].delay)
    }

    /// Iterates over every RR node used by the tree.
    pub fn rr_nodes(&self) -> impl Iterator<Item = RrNodeId> + '_ {
        self.nodes.iter().map(|n| n.inode)
    }

    /// Collects the tree nodes whose coordinates lie inside `bb`, with
    /// their cumulative delays. These seed a bounded connection search.
    pub fn seeds_in_bb(&self, rr: &RrGraph, bb: &Bounds) -> Vec<(RrNodeId, f32)> {
        self.nodes
            .iter()
            .filter(|n| rr.inside_bb(n.inode, bb))
            .map(|n| (n.inode, n.delay))
            .collect()
    }

    /// Splices a root-to-target path into the tree.
    ///
    /// `path[0]` must already be in the tree; later elements that are
    /// already present are skipped (re-rooting the splice at them), and the
    /// rest are appended as a chain. Returns the RR nodes that are new to
    /// the tree and the cumulative delay at the path's last node.
    pub fn add_path(&mut self, path: &[RrNodeId], rr: &RrGraph) -> (Vec<RrNodeId>, f32) {
        assert!(!path.is_empty(), "cannot splice an empty path");
        let mut at = *self
            .index
            .get(&path[0])
            .expect("path must start at a node already in the tree");
        let mut new_nodes = Vec::new();
        for &inode in &path[1..] {
            if let Some(&existing) = self.index.get(&inode) {
                at = existing;
                continue;
            }
            let delay = self.nodes[at].delay + rr.base_cost(inode);
            self.nodes.push(RtNode {
                inode,
                parent: Some(at),
                delay,
            });
            at = self.nodes.len() - 1;
            self.index.insert(inode, at);
            new_nodes.push(inode);
        }
        (new_nodes, self.nodes[at].delay)
    }

    /// Records a sink as reached with the given source-to-sink delay.
    pub fn mark_reached(&mut self, isink: usize, delay: f32) {
        self.reached[isink] = Some(delay);
    }

    /// Iterates over reached sinks with their delays.
    pub fn reached_isinks(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.reached
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.map(|d| (i, d)))
    }

    /// Iterates over sinks not yet reached.
    pub fn remaining_isinks(&self) -> impl Iterator<Item = usize> + '_ {
        self.reached
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.is_none().then_some(i))
    }

    /// The recorded delay to a sink, if reached.
    pub fn sink_delay(&self, isink: usize) -> Option<f32> {
        self.reached[isink]
    }

    /// Whether every sink has been reached.
    pub fn is_complete(&self) -> bool {
        self.reached.iter().all(|d| d.is_some())
    }

    /// Rebuilds the node index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.inode, i))
            .collect();
    }
}

/// All per-net route trees, each behind its own mutex.
#[derive(Debug)]
pub struct RouteTrees {
    inner: Vec<Mutex<Option<RouteTree>>>,
}

impl RouteTrees {
    /// Creates an empty slot for each of `num_nets` nets.
    pub fn new(num_nets: usize) -> Self {
        Self {
            inner: (0..num_nets).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Number of net slots.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns whether there are no net slots.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Locks the tree slot of a net.
    pub fn lock(&self, net: weft_common::NetId) -> MutexGuard<'_, Option<RouteTree>> {
        self.inner[net.index()].lock().unwrap()
    }

    /// Clones every tree for a best-routing snapshot.
    pub fn snapshot(&self) -> Vec<Option<RouteTree>> {
        self.inner
            .iter()
            .map(|slot| slot.lock().unwrap().clone())
            .collect()
    }

    /// Replaces every tree from a snapshot.
    pub fn restore(&mut self, snapshot: Vec<Option<RouteTree>>) {
        assert_eq!(snapshot.len(), self.inner.len());
        for (slot, tree) in self.inner.iter_mut().zip(snapshot) {
            *slot.get_mut().unwrap() = tree;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_common::NetId;
    use weft_fabric::DeviceGrid;

    fn rr() -> RrGraph {
        RrGraph::mesh(DeviceGrid::new(8, 8).unwrap(), 1)
    }

    #[test]
    fn single_source_tree() {
        let rr = rr();
        let root = rr.node_at(2, 2);
        let tree = RouteTree::single_source(root, 3);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert_eq!(tree.remaining_isinks().count(), 3);
        assert!(!tree.is_complete());
        assert_eq!(tree.node_delay(root), Some(0.0));
    }

    #[test]
    fn add_path_accumulates_delay() {
        let rr = rr();
        let root = rr.node_at(0, 0);
        let mut tree = RouteTree::single_source(root, 1);
        let path = vec![root, rr.node_at(1, 0), rr.node_at(2, 0)];
        let (new_nodes, delay) = tree.add_path(&path, &rr);
        assert_eq!(new_nodes.len(), 2);
        assert_eq!(delay, 2.0);
        assert_eq!(tree.len(), 3);
        assert!(tree.contains(rr.node_at(2, 0)));
    }

    #[test]
    fn add_path_skips_existing_nodes() {
        let rr = rr();
        let root = rr.node_at(0, 0);
        let mut tree = RouteTree::single_source(root, 2);
        tree.add_path(&[root, rr.node_at(1, 0), rr.node_at(2, 0)], &rr);
        // A second path branching off the existing chain.
        let (new_nodes, delay) =
            tree.add_path(&[root, rr.node_at(1, 0), rr.node_at(1, 1)], &rr);
        assert_eq!(new_nodes, vec![rr.node_at(1, 1)]);
        assert_eq!(delay, 2.0);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn reached_and_remaining_partition_sinks() {
        let rr = rr();
        let mut tree = RouteTree::single_source(rr.node_at(0, 0), 3);
        tree.mark_reached(1, 4.0);
        let reached: Vec<_> = tree.reached_isinks().collect();
        assert_eq!(reached, vec![(1, 4.0)]);
        let remaining: Vec<_> = tree.remaining_isinks().collect();
        assert_eq!(remaining, vec![0, 2]);
        assert_eq!(tree.sink_delay(1), Some(4.0));
    }

    #[test]
    fn seeds_filtered_by_bb() {
        let rr = rr();
        let root = rr.node_at(0, 0);
        let mut tree = RouteTree::single_source(root, 1);
        tree.add_path(
            &[root, rr.node_at(1, 0), rr.node_at(2, 0), rr.node_at(3, 0)],
            &rr,
        );
        let seeds = tree.seeds_in_bb(&rr, &Bounds::new(2, 0, 7, 7));
        let nodes: Vec<_> = seeds.iter().map(|&(n, _)| n).collect();
        assert_eq!(nodes, vec![rr.node_at(2, 0), rr.node_at(3, 0)]);
    }

    #[test]
    fn serde_roundtrip_rebuilds_index() {
        let rr = rr();
        let root = rr.node_at(4, 4);
        let mut tree = RouteTree::single_source(root, 1);
        tree.add_path(&[root, rr.node_at(5, 4)], &rr);
        tree.mark_reached(0, 1.0);

        let json = serde_json::to_string(&tree).unwrap();
        let mut restored: RouteTree = serde_json::from_str(&json).unwrap();
        restored.rebuild_index();
        assert!(restored.contains(rr.node_at(5, 4)));
        assert_eq!(restored.sink_delay(0), Some(1.0));
        assert!(restored.is_complete());
    }

    #[test]
    fn trees_snapshot_restore() {
        let rr = rr();
        let mut trees = RouteTrees::new(2);
        let net = NetId::from_raw(0);
        *trees.lock(net) = Some(RouteTree::single_source(rr.node_at(1, 1), 1));
        let snap = trees.snapshot();

        *trees.lock(net) = None;
        trees.restore(snap);
        assert!(trees.lock(net).is_some());
        assert!(trees.lock(NetId::from_raw(1)).is_none());
    }
}
