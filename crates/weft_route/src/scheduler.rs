//! The partition-tree scheduler.
//!
//! Tree nodes are tasks on a work-stealing pool. A node first routes its
//! own nets (decomposing the eligible ones into virtual halves for its
//! children), then the virtual nets pushed down by its ancestors, and only
//! then spawns its two children, so parent work is always complete before
//! either child starts. Siblings run concurrently; the partition invariants
//! keep their bounding boxes, and therefore their slices of the shared
//! congestion state, disjoint.

use crate::connection::RouterHeap;
use crate::decompose::MAX_DECOMP_REROUTE;
use crate::net_router::{
    route_and_decompose, route_virtual_net, route_whole_net, should_decompose, RouteIterCtx,
};
use crate::partition::{PartitionTree, PartitionTreeNode};
use crate::stats::RouterStats;
use std::sync::atomic::Ordering;
use std::time::Instant;
use weft_common::NetId;

/// Routing results reduced over a whole partition tree.
#[derive(Debug)]
pub(crate) struct RouteIterResults {
    /// False when any connection was impossible even with a full-device
    /// bounding box (disconnected routing graph).
    pub is_routable: bool,
    /// Nets whose routing was actually changed this iteration.
    pub rerouted_nets: Vec<NetId>,
    /// Merged per-worker counters.
    pub stats: RouterStats,
}

impl Default for RouteIterResults {
    fn default() -> Self {
        Self {
            is_routable: true,
            rerouted_nets: Vec::new(),
            stats: RouterStats::default(),
        }
    }
}

/// Routes every net in the tree on the given pool and reduces the
/// per-node results. Blocks until the whole tree has been processed.
pub(crate) fn route_partition_tree<H: RouterHeap>(
    pool: &rayon::ThreadPool,
    tree: &mut PartitionTree,
    ctx: &RouteIterCtx<'_, H>,
) -> RouteIterResults {
    ctx.nets_to_retry.lock().unwrap().clear();
    if let Some(root) = tree.root_mut() {
        pool.install(|| rayon::scope(|scope| route_node(scope, root, ctx, 0)));
    }

    let mut results = RouteIterResults::default();
    if let Some(root) = tree.root() {
        reduce_node(root, &mut results);
    }
    results
}

/// Routes one tree node, then hands its children to the pool.
fn route_node<'a, 'e: 'a, H: RouterHeap>(
    scope: &rayon::Scope<'a>,
    node: &'a mut PartitionTreeNode,
    ctx: &'a RouteIterCtx<'e, H>,
    level: usize,
) {
    let start = Instant::now();
    node.is_routable = true;
    node.rerouted_nets.clear();

    // Fattest nets first: they dominate the node's work and give sibling
    // tasks more slack to steal.
    let mut nets = std::mem::take(&mut node.nets);
    nets.sort_by(|&a, &b| ctx.netlist.net_fanout(b).cmp(&ctx.netlist.net_fanout(a)));

    let mut kept = Vec::with_capacity(nets.len());
    for net in nets {
        if node.left.is_some() && node.right.is_some() && should_decompose(ctx, net, node, level) {
            if let Some((low, high)) = route_and_decompose(ctx, net, node) {
                node.left.as_mut().unwrap().virtual_nets.push(low);
                node.right.as_mut().unwrap().virtual_nets.push(high);
                node.rerouted_nets.push(net);
                kept.push(net);
                continue;
            }
        }

        let flags = route_whole_net(ctx, net);
        if !flags.success && !flags.retry_with_full_bb {
            node.is_routable = false;
        }
        if flags.was_rerouted {
            node.rerouted_nets.push(net);
        }
        if flags.retry_with_full_bb {
            // Escalates to the tree root with a full-device box next
            // iteration.
            ctx.nets_to_retry.lock().unwrap().push(net);
        } else {
            kept.push(net);
        }
    }
    node.nets = kept;

    let virtual_nets = std::mem::take(&mut node.virtual_nets);
    for vnet in &virtual_nets {
        let flags = route_virtual_net(ctx, vnet);
        if !flags.success && !flags.retry_with_full_bb {
            // The cutline left no usable resources on this side. Route the
            // net serially from now on; it keeps its remaining sinks and
            // reroutes whole next iteration.
            ctx.decomp_retries[vnet.net.index()].store(MAX_DECOMP_REROUTE, Ordering::Relaxed);
        } else if flags.retry_with_full_bb {
            ctx.nets_to_retry.lock().unwrap().push(vnet.net);
        }
    }
    node.virtual_nets = virtual_nets;

    ctx.log.log(format!(
        "node with {} nets and {} virtual nets routed in {:.3}s (level {})",
        node.nets.len(),
        node.virtual_nets.len(),
        start.elapsed().as_secs_f32(),
        level
    ));

    match (node.left.as_deref_mut(), node.right.as_deref_mut()) {
        (Some(left), Some(right)) => {
            scope.spawn(move |s| route_node(s, left, ctx, level + 1));
            scope.spawn(move |s| route_node(s, right, ctx, level + 1));
        }
        (None, None) => {}
        _ => unreachable!("a partition-tree node never has exactly one child"),
    }
}

fn reduce_node(node: &PartitionTreeNode, results: &mut RouteIterResults) {
    results.is_routable &= node.is_routable;
    results
        .rerouted_nets
        .extend_from_slice(&node.rerouted_nets);
    if let Some(left) = &node.left {
        reduce_node(left, results);
    }
    if let Some(right) = &node.right {
        reduce_node(right, results);
    }
}
