//! Net-level routing drivers.
//!
//! The partition-tree scheduler routes each net through one of three paths:
//! whole-net routing at the node that owns it, skeleton routing followed by
//! decomposition into two virtual halves, or virtual-net routing of one
//! half inside its clipped bounding box. All three delegate individual
//! connections to the worker-local connection router.

use crate::connection::{ConnCostParams, MazeRouter, RouterHeap};
use crate::debug::PartitionTreeLog;
use crate::decompose::{
    choose_skeleton_sinks, make_decomposed_pair, should_decompose_net, VirtualNet,
};
use crate::opts::{RouterOpts, RoutingBudgetsAlgorithm};
use crate::partition::PartitionTreeNode;
use crate::reroute::{NetStatus, ReroutePolicy};
use crate::route_tree::{RouteTree, RouteTrees};
use crate::stats::RouterStats;
use crate::timing::{Criticalities, RouteBudgets};
use crate::worker::WorkerLocal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use weft_common::{Bounds, NetId, RrNodeId};
use weft_fabric::{CongestionCosts, Netlist, RouteBbs, RrGraph};

/// Everything one routing iteration shares across its tasks.
///
/// Cheap to share: plain borrows plus atomics. One instance lives on the
/// controller's stack per iteration and every partition-tree task reads it.
pub(crate) struct RouteIterCtx<'e, H: RouterHeap> {
    pub netlist: &'e Netlist,
    pub rr: &'e RrGraph,
    pub opts: &'e RouterOpts,
    pub itry: usize,
    pub pres_fac: f32,
    pub crits: &'e Criticalities,
    pub budgets: &'e RouteBudgets,
    pub worst_neg_slack: f32,
    pub trees: &'e RouteTrees,
    pub congestion: &'e CongestionCosts,
    pub bbs: &'e RouteBbs,
    pub reroute: &'e ReroutePolicy,
    pub routers: &'e WorkerLocal<MazeRouter<H>>,
    pub stats: &'e WorkerLocal<RouterStats>,
    pub nets_to_retry: &'e Mutex<Vec<NetId>>,
    pub decomp_retries: &'e [AtomicUsize],
    pub status: &'e NetStatus,
    pub log: &'e PartitionTreeLog,
}

/// Outcome of routing one net (or one virtual half).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NetResultFlags {
    /// Every attempted connection was completed.
    pub success: bool,
    /// The net needs a full-device bounding box; escalate it to the retry
    /// queue.
    pub retry_with_full_bb: bool,
    /// The net's routing was actually changed.
    pub was_rerouted: bool,
}

/// Does this net need routing work at all this iteration?
pub(crate) fn should_really_route_net<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
) -> bool {
    let mut reroute_for_hold = false;
    if ctx.budgets.if_set() {
        reroute_for_hold = ctx.budgets.get_should_reroute(net) && ctx.worst_neg_slack != 0.0;
    }
    if ctx.status.is_fixed(net) {
        // Pre-routed nets are never touched.
        return false;
    }
    if ctx.netlist.net_is_ignored(net) {
        return false;
    }
    if ctx.status.is_routed(net) {
        // Already handled earlier this iteration.
        return false;
    }
    if reroute_for_hold {
        return true;
    }

    let guard = ctx.trees.lock(net);
    match guard.as_ref() {
        None => true,
        Some(tree) => {
            if !tree.is_complete() || ctx.reroute.is_forced(net) {
                return true;
            }
            // Legal and complete routing is left alone; congested routing
            // is renegotiated.
            tree.rr_nodes()
                .any(|n| ctx.congestion.occupancy(n) > ctx.rr.capacity(n))
        }
    }
}

/// Rips up any previous routing of `net` and installs a fresh
/// single-source tree.
fn setup_routing_resources<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    slot: &mut Option<RouteTree>,
) {
    if let Some(old) = slot.take() {
        for node in old.rr_nodes() {
            ctx.congestion.remove_use(node);
        }
    }
    let (sx, sy) = ctx.netlist.net(net).source;
    let root = ctx.rr.node_at(sx, sy);
    ctx.congestion.add_use(root);
    *slot = Some(RouteTree::single_source(root, ctx.netlist.net_fanout(net)));
}

fn sink_cost_params<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    isink: usize,
) -> ConnCostParams {
    let delay_budget = match ctx.opts.routing_budgets_algorithm {
        RoutingBudgetsAlgorithm::Yoyo => ctx.budgets.budget(net, isink),
        RoutingBudgetsAlgorithm::Disabled => None,
    };
    ConnCostParams {
        criticality: ctx.crits.criticality(net, isink),
        astar_fac: ctx.opts.astar_fac,
        pres_fac: ctx.pres_fac,
        delay_budget,
    }
}

/// Runs a bounded connection search on the calling worker's router.
fn search_sink<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    isink: usize,
    bb: &Bounds,
    seeds: &[(RrNodeId, f32)],
) -> Option<Vec<RrNodeId>> {
    let (x, y) = ctx.netlist.net_sinks(net)[isink];
    let target = ctx.rr.node_at(x, y);
    let params = sink_cost_params(ctx, net, isink);
    ctx.routers.with(MazeRouter::<H>::default, |router| {
        ctx.stats.with(RouterStats::default, |stats| {
            router.route_sink(ctx.rr, ctx.congestion, &params, bb, seeds, target, stats)
        })
    })
}

/// Splices a found path into the tree and does the per-connection
/// bookkeeping.
fn commit_sink_path<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    isink: usize,
    tree: &mut RouteTree,
    path: &[RrNodeId],
) {
    let (new_nodes, delay) = tree.add_path(path, ctx.rr);
    for node in new_nodes {
        ctx.congestion.add_use(node);
    }
    tree.mark_reached(isink, delay);
    ctx.reroute.update_lower_bound(net, isink, delay);
    ctx.stats
        .with(RouterStats::default, |s| s.connections_routed += 1);
}

/// Routes one sink of a net whose tree guard the caller already holds.
fn route_sink_locked<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    isink: usize,
    bb: &Bounds,
    tree: &mut RouteTree,
) -> bool {
    let seeds = tree.seeds_in_bb(ctx.rr, bb);
    if seeds.is_empty() {
        return false;
    }
    match search_sink(ctx, net, isink, bb, &seeds) {
        Some(path) => {
            commit_sink_path(ctx, net, isink, tree, &path);
            true
        }
        None => false,
    }
}

/// Sink indices of `net` still to route, most critical first.
fn remaining_sinks_by_criticality<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    tree: &RouteTree,
) -> Vec<usize> {
    let mut remaining: Vec<usize> = tree.remaining_isinks().collect();
    remaining.sort_by(|&a, &b| {
        ctx.crits
            .criticality(net, b)
            .partial_cmp(&ctx.crits.criticality(net, a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    remaining
}

/// Routes every remaining sink of a net inside its current bounding box.
///
/// On a search failure the flags distinguish "impossible even with the
/// whole device" (unroutable, fatal for the call) from "blocked inside
/// this box" (escalate with a full-device box next iteration).
pub(crate) fn route_whole_net<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
) -> NetResultFlags {
    let mut flags = NetResultFlags::default();
    if !should_really_route_net(ctx, net) {
        flags.success = true;
        return flags;
    }
    flags.was_rerouted = true;

    let bb = ctx.bbs.get(net);
    let mut slot = ctx.trees.lock(net);
    setup_routing_resources(ctx, net, &mut slot);
    let tree = slot.as_mut().expect("tree installed by setup");

    for isink in remaining_sinks_by_criticality(ctx, net, tree) {
        if !route_sink_locked(ctx, net, isink, &bb, tree) {
            if bb == ctx.rr.grid().full_bounds() {
                ctx.log.log(format!(
                    "routing failed for net {net}: disconnected routing graph"
                ));
                return flags;
            }
            flags.retry_with_full_bb = true;
            return flags;
        }
    }

    flags.success = true;
    ctx.status.set_routed(net, true);
    ctx.reroute.set_forced(net, false);
    if ctx.budgets.if_set() {
        ctx.budgets.set_should_reroute(net, false);
    }
    ctx.stats.with(RouterStats::default, |s| s.nets_routed += 1);
    flags
}

/// Routes a skeleton over the net's bounding box, then splits the net in
/// two at the node's cutline.
///
/// Returns `None` when the net needs no routing, has no cutline to split
/// at, or any skeleton connection fails; the caller then falls back to
/// routing the net whole.
pub(crate) fn route_and_decompose<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    node: &PartitionTreeNode,
) -> Option<(VirtualNet, VirtualNet)> {
    let pos = node.cutline_pos?;
    let axis = node.cutline_axis;
    if !should_really_route_net(ctx, net) {
        return None;
    }

    let bb = ctx.bbs.get(net);
    let sinks = ctx.netlist.net_sinks(net);
    let mut slot = ctx.trees.lock(net);
    setup_routing_resources(ctx, net, &mut slot);
    let tree = slot.as_mut().expect("tree installed by setup");

    let remaining = remaining_sinks_by_criticality(ctx, net, tree);
    let remaining_with_coords: Vec<(usize, (i32, i32))> =
        remaining.iter().map(|&i| (i, sinks[i])).collect();
    let reached_coords: Vec<(i32, i32)> =
        tree.reached_isinks().map(|(i, _)| sinks[i]).collect();

    let skeleton = choose_skeleton_sinks(&bb, reached_coords.into_iter(), &remaining_with_coords);
    ctx.log.log(format!(
        "decomposing net {} with {} skeleton sinks, bbox {}",
        net,
        skeleton.len(),
        bb
    ));

    for isink in skeleton {
        if !route_sink_locked(ctx, net, isink, &bb, tree) {
            // Partial skeleton stays in place; whole-net fallback rips it
            // up.
            return None;
        }
    }

    ctx.decomp_retries[net.index()].fetch_add(1, Ordering::Relaxed);
    Some(make_decomposed_pair(net, &bb, pos, axis))
}

/// Should the scheduler try to decompose this net at this node?
pub(crate) fn should_decompose<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    net: NetId,
    node: &PartitionTreeNode,
    level: usize,
) -> bool {
    let Some(pos) = node.cutline_pos else {
        return false;
    };
    should_decompose_net(
        level,
        ctx.opts.num_workers,
        ctx.netlist.net_is_global(net),
        ctx.opts.two_stage_clock_routing,
        ctx.decomp_retries[net.index()].load(Ordering::Relaxed),
        &ctx.bbs.get(net),
        ctx.netlist.net_pin_count(net),
        pos,
        node.cutline_axis,
    )
}

/// Routes one virtual half of a decomposed net.
///
/// Sink membership is the clipped box; every search is bounded by it. The
/// sibling half may run concurrently on another worker: seeds are
/// snapshotted and paths spliced under the net's tree lock, searches run
/// outside it.
pub(crate) fn route_virtual_net<H: RouterHeap>(
    ctx: &RouteIterCtx<'_, H>,
    vnet: &VirtualNet,
) -> NetResultFlags {
    let net = vnet.net;
    let sinks = ctx.netlist.net_sinks(net);
    let mut flags = NetResultFlags {
        was_rerouted: true,
        ..NetResultFlags::default()
    };

    let remaining = {
        let guard = ctx.trees.lock(net);
        let tree = guard.as_ref().expect("decomposed net has a tree");
        let mut remaining: Vec<usize> = tree
            .remaining_isinks()
            .filter(|&i| vnet.clipped_bb.contains(sinks[i].0, sinks[i].1))
            .collect();
        remaining.sort_by(|&a, &b| {
            ctx.crits
                .criticality(net, b)
                .partial_cmp(&ctx.crits.criticality(net, a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        remaining
    };

    if ctx.budgets.if_set() {
        ctx.budgets.set_should_reroute(net, false);
    }

    for isink in remaining {
        let seeds = {
            let guard = ctx.trees.lock(net);
            guard
                .as_ref()
                .expect("decomposed net has a tree")
                .seeds_in_bb(ctx.rr, &vnet.clipped_bb)
        };
        if seeds.is_empty() {
            // The skeleton never crossed into this side; there is nothing
            // to grow from.
            return flags;
        }
        let Some(path) = search_sink(ctx, net, isink, &vnet.clipped_bb, &seeds) else {
            return flags;
        };
        let mut guard = ctx.trees.lock(net);
        let tree = guard.as_mut().expect("decomposed net has a tree");
        commit_sink_path(ctx, net, isink, tree, &path);
    }

    flags.success = true;
    ctx.stats.with(RouterStats::default, |s| s.nets_routed += 1);
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Harness;
    use weft_common::Side;
    use weft_fabric::{DeviceGrid, Net, Netlist};

    fn harness(nets: Vec<Net>, capacity: u32) -> Harness {
        let mut nl = Netlist::new(DeviceGrid::new(10, 10).unwrap());
        for net in nets {
            nl.add_net(net).unwrap();
        }
        Harness::new(nl, capacity)
    }

    #[test]
    fn routes_single_net_whole() {
        let h = harness(vec![Net::new("n", (0, 0), vec![(5, 0), (0, 5)])], 1);
        let ctx = h.ctx();
        let net = NetId::from_raw(0);
        let flags = route_whole_net(&ctx, net);
        assert!(flags.success);
        assert!(flags.was_rerouted);
        assert!(!flags.retry_with_full_bb);

        let guard = h.trees.lock(net);
        let tree = guard.as_ref().unwrap();
        assert!(tree.is_complete());
        // Source plus both arms are occupied.
        assert_eq!(h.congestion.used_wirelength() as usize, tree.len());
    }

    #[test]
    fn skips_ignored_nets() {
        let h = harness(vec![Net::new("n", (0, 0), vec![(5, 0)]).ignored()], 1);
        let ctx = h.ctx();
        let flags = route_whole_net(&ctx, NetId::from_raw(0));
        assert!(flags.success);
        assert!(!flags.was_rerouted);
        assert!(h.trees.lock(NetId::from_raw(0)).is_none());
    }

    #[test]
    fn skips_legal_complete_routing() {
        let h = harness(vec![Net::new("n", (0, 0), vec![(3, 0)])], 1);
        {
            let ctx = h.ctx();
            assert!(route_whole_net(&ctx, NetId::from_raw(0)).success);
        }
        let ctx = h.ctx();
        // Second call finds a complete legal tree and does nothing.
        let flags = route_whole_net(&ctx, NetId::from_raw(0));
        assert!(flags.success);
        assert!(!flags.was_rerouted);
    }

    #[test]
    fn blocked_box_requests_full_bb_retry() {
        let mut h = harness(vec![Net::new("n", (0, 0), vec![(2, 0)])], 1);
        // Wall inside the (tight) box between source and sink.
        h.block_column(1, 0, 0);
        let ctx = h.ctx();
        let flags = route_whole_net(&ctx, NetId::from_raw(0));
        assert!(!flags.success);
        assert!(flags.retry_with_full_bb);
    }

    #[test]
    fn unroutable_with_full_device_bb_fails_hard() {
        let mut h = harness(vec![Net::new("n", (0, 0), vec![(2, 0)])], 1);
        h.block_column(1, 0, 9);
        h.bbs.set_full_device(NetId::from_raw(0));
        let ctx = h.ctx();
        let flags = route_whole_net(&ctx, NetId::from_raw(0));
        assert!(!flags.success);
        assert!(!flags.retry_with_full_bb);
        assert!(!h.log.is_empty());
    }

    #[test]
    fn rip_up_releases_occupancy() {
        let h = harness(vec![Net::new("n", (0, 0), vec![(4, 0)])], 1);
        {
            let ctx = h.ctx();
            assert!(route_whole_net(&ctx, NetId::from_raw(0)).success);
        }
        let used_before = h.congestion.used_wirelength();
        {
            let ctx = h.ctx();
            let mut slot = h.trees.lock(NetId::from_raw(0));
            setup_routing_resources(&ctx, NetId::from_raw(0), &mut slot);
        }
        // Only the fresh source node remains occupied.
        assert!(used_before > 1);
        assert_eq!(h.congestion.used_wirelength(), 1);
    }

    #[test]
    fn virtual_net_without_seeds_fails() {
        let h = harness(vec![Net::new("n", (0, 0), vec![(8, 0)])], 1);
        let net = NetId::from_raw(0);
        {
            let ctx = h.ctx();
            let mut slot = h.trees.lock(net);
            setup_routing_resources(&ctx, net, &mut slot);
        }
        // The high half has no tree nodes: the skeleton never crossed.
        let vnet = VirtualNet {
            net,
            clipped_bb: weft_common::Bounds::new(5, 0, 9, 9),
            side: Side::High,
        };
        let ctx = h.ctx();
        let flags = route_virtual_net(&ctx, &vnet);
        assert!(!flags.success);
        assert!(!flags.retry_with_full_bb);
    }

    #[test]
    fn virtual_net_routes_its_side_only() {
        let h = harness(
            vec![Net::new("n", (4, 4), vec![(1, 4), (8, 4), (8, 8)])],
            2,
        );
        let net = NetId::from_raw(0);
        {
            let ctx = h.ctx();
            let mut slot = h.trees.lock(net);
            setup_routing_resources(&ctx, net, &mut slot);
        }
        let vnet = VirtualNet {
            net,
            clipped_bb: weft_common::Bounds::new(0, 0, 4, 9),
            side: Side::Low,
        };
        let ctx = h.ctx();
        let flags = route_virtual_net(&ctx, &vnet);
        assert!(flags.success);

        let guard = h.trees.lock(net);
        let tree = guard.as_ref().unwrap();
        // Only the low-side sink was this half's responsibility.
        assert!(tree.sink_delay(0).is_some());
        assert!(tree.sink_delay(1).is_none());
        assert!(tree.sink_delay(2).is_none());
    }
}
