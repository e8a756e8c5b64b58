//! The outer routing loop.
//!
//! [`ParallelRouter`] owns all cross-iteration state: route trees,
//! congestion costs, bounding boxes, reroute policy and the debug log. Each
//! iteration builds a fresh partition tree, dispatches it to the worker
//! pool, then renegotiates congestion: the present penalty grows
//! geometrically, history costs accumulate on overused nodes, escalated
//! nets get full-device boxes, and in conflicted mode all boxes are
//! periodically rescaled. Legal convergences snapshot the best routing seen
//! so far, which is restored at the end.

use crate::connection::{BinaryHeapQueue, BucketQueue, MazeRouter, RouterHeap};
use crate::debug::{PartitionTreeLog, PARTITION_TREE_LOG_FILE};
use crate::decompose::MAX_DECOMP_REROUTE;
use crate::net_router::RouteIterCtx;
use crate::opts::{
    IncrRerouteDelayRipup, InitialTiming, RouteBbUpdate, RouterHeapKind, RouterOpts,
    RoutingBudgetsAlgorithm, RoutingFailurePredictor,
};
use crate::partition::PartitionTree;
use crate::predictor::RoutingPredictor;
use crate::report::{print_route_status, print_route_status_header};
use crate::reroute::{NetStatus, ReroutePolicy};
use crate::route_tree::{RouteTree, RouteTrees};
use crate::scheduler::route_partition_tree;
use crate::stats::RouterStats;
use crate::timing::{critical_path_delay, Criticalities, RouteBudgets, RoutingMetrics, TimingInfo};
use crate::worker::WorkerLocal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use weft_common::{Bounds, InternalError, NetId, WeftResult};
use weft_fabric::{CongestionCosts, Netlist, RouteBbs, RrGraph};

/// Bounding boxes are rescaled by this factor in conflicted mode...
const BB_SCALE_FACTOR: i32 = 2;
/// ...every this many conflicted-mode iterations.
const BB_SCALE_ITER_COUNT: usize = 5;

/// With RCV active, stop waiting for hold resolution after this many
/// iterations in which the budgets report themselves finished.
const RCV_FINISH_EARLY_COUNTDOWN: i32 = 15;

/// Predicted-success abort thresholds, as multiples of the iteration
/// limit.
const ABORT_FACTOR_SAFE: f32 = 1.5;
const ABORT_FACTOR_AGGRESSIVE: f32 = 1.2;

/// Only consider a predicted abort with at least this much overuse.
const MIN_OVERUSE_FOR_ABORT: usize = 64;

/// Give up after iteration 1 when this fraction of the device wirelength
/// is already in use.
const INIT_WIRELENGTH_ABORT_FRAC: f32 = 0.85;

/// After a legal convergence, stop once this many iterations pass without
/// another one.
const RECONVERGENCE_EXIT_WINDOW: i32 = 5;

/// Upper clamp keeping the congestion penalty finite at high iteration
/// counts.
const PRES_FAC_MAX: f32 = 1e25;

/// Delay added to struggling hold windows each budget-relaxation step.
const BUDGET_INCREASE_AMOUNT: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterCongestionMode {
    Normal,
    Conflicted,
}

/// The parallel net router: persistent routing state plus the iteration
/// loop.
pub struct ParallelRouter<'a> {
    netlist: &'a Netlist,
    rr: &'a RrGraph,
    opts: RouterOpts,
    timing: Option<TimingInfo>,
    trees: RouteTrees,
    congestion: CongestionCosts,
    bbs: RouteBbs,
    budgets: RouteBudgets,
    reroute: ReroutePolicy,
    status: NetStatus,
    decomp_retries: Vec<AtomicUsize>,
    log: PartitionTreeLog,
    output_dir: PathBuf,
    stats_total: RouterStats,
    iterations_used: usize,
}

impl<'a> ParallelRouter<'a> {
    /// Creates a router over a netlist and routing-resource graph.
    pub fn new(netlist: &'a Netlist, rr: &'a RrGraph, opts: RouterOpts) -> WeftResult<Self> {
        opts.validate()?;
        if netlist.grid() != rr.grid() {
            return Err(InternalError::new(
                "netlist and routing graph cover different device grids",
            ));
        }
        let num_nets = netlist.len();
        let bbs = RouteBbs::load(netlist, opts.bb_factor);
        Ok(Self {
            netlist,
            rr,
            opts,
            timing: None,
            trees: RouteTrees::new(num_nets),
            congestion: CongestionCosts::new(rr.num_nodes()),
            bbs,
            budgets: RouteBudgets::disabled(netlist),
            reroute: ReroutePolicy::new(netlist),
            status: NetStatus::new(num_nets),
            decomp_retries: (0..num_nets).map(|_| AtomicUsize::new(0)).collect(),
            log: PartitionTreeLog::new(),
            output_dir: PathBuf::from("."),
            stats_total: RouterStats::default(),
            iterations_used: 0,
        })
    }

    /// Enables timing-driven routing against the given clock period.
    pub fn set_timing(&mut self, timing: TimingInfo) {
        self.timing = Some(timing);
    }

    /// Directory for `partition_tree.log` and per-iteration snapshots.
    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output_dir = dir.into();
    }

    /// Marks a net as pre-routed; the router will never touch it.
    pub fn mark_net_fixed(&self, net: NetId) {
        self.status.set_fixed(net, true);
    }

    /// The current route tree of a net, if any.
    pub fn route_tree(&self, net: NetId) -> Option<RouteTree> {
        self.trees.lock(net).clone()
    }

    /// The current routing bounding box of a net.
    pub fn route_bb(&self, net: NetId) -> Bounds {
        self.bbs.get(net)
    }

    /// Whether decomposition has been disabled for a net.
    pub fn decomposition_disabled(&self, net: NetId) -> bool {
        self.decomp_retries[net.index()].load(Ordering::Relaxed) >= MAX_DECOMP_REROUTE
    }

    /// Counters accumulated over the whole run.
    pub fn stats(&self) -> RouterStats {
        self.stats_total
    }

    /// Number of iterations the last [`route`](Self::route) call ran.
    pub fn iterations_used(&self) -> usize {
        self.iterations_used
    }

    /// The thread-safe debug log.
    pub fn debug_log(&self) -> &PartitionTreeLog {
        &self.log
    }

    /// Whether the current routing uses no node beyond its capacity.
    pub fn is_feasible(&self) -> bool {
        self.congestion.is_feasible(self.rr)
    }

    /// Routes the whole netlist. Returns `true` when a legal routing was
    /// found and restored.
    pub fn route(&mut self) -> bool {
        match self.opts.router_heap {
            RouterHeapKind::BinaryHeap => self.route_with::<BinaryHeapQueue>(),
            RouterHeapKind::BucketHeapApproximation => self.route_with::<BucketQueue>(),
        }
    }

    fn route_with<H: RouterHeap>(&mut self) -> bool {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.num_workers)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                eprintln!("error: failed to build the routing pool: {e}");
                return false;
            }
        };

        let max_iters = self.opts.max_router_iterations;
        let abort_threshold = match self.opts.routing_failure_predictor {
            RoutingFailurePredictor::Off => f32::INFINITY,
            RoutingFailurePredictor::Safe => ABORT_FACTOR_SAFE * max_iters as f32,
            RoutingFailurePredictor::Aggressive => ABORT_FACTOR_AGGRESSIVE * max_iters as f32,
        };
        let congested_iteration_threshold =
            self.opts.congested_routing_iteration_threshold_frac * max_iters as f32;
        let available_wirelength = self.rr.total_capacity();

        let mut predictor = RoutingPredictor::new();
        let routers: WorkerLocal<MazeRouter<H>> = WorkerLocal::new(self.opts.num_workers);
        let mut worker_stats: WorkerLocal<RouterStats> = WorkerLocal::new(self.opts.num_workers);
        let nets_to_retry: Mutex<Vec<NetId>> = Mutex::new(Vec::new());

        let mut crits = match (&self.timing, self.opts.initial_timing) {
            (Some(_), InitialTiming::AllCritical) => Criticalities::constant(self.netlist, 1.0),
            (Some(timing), InitialTiming::Lookahead) => Criticalities::lookahead(
                self.netlist,
                timing,
                self.opts.max_criticality,
                self.opts.criticality_exp,
            ),
            (None, _) => Criticalities::constant(self.netlist, 0.0),
        };

        let mut pres_fac = self.opts.first_iter_pres_fac;
        let mut bb_fac = self.opts.bb_factor;
        let mut congestion_mode = RouterCongestionMode::Normal;
        let mut itry_conflicted_mode = 0usize;
        let mut itry_since_last_convergence: i32 = -1;
        let mut legal_convergence_count = 0usize;
        let mut rcv_finished_count = RCV_FINISH_EARLY_COUNTDOWN;
        let mut num_bbs_updated = 0usize;
        let mut best: Option<(Vec<Option<RouteTree>>, RoutingMetrics)> = None;
        let mut routing_is_successful = false;

        let run_timer = Instant::now();
        let mut prev_cumm_time = 0.0f32;

        print_route_status_header();

        for itry in 1..=max_iters {
            self.iterations_used = itry;
            self.status.reset_routed();
            if itry_since_last_convergence >= 0 {
                itry_since_last_convergence += 1;
            }

            let worst_neg_slack = if self.budgets.if_set() {
                self.budgets
                    .hold_worst_negative_slack(self.netlist, &self.trees)
            } else {
                0.0
            };

            let build_timer = Instant::now();
            let mut tree = PartitionTree::build(self.netlist, &self.bbs);
            self.log.log(format!(
                "iteration {itry}: built partition tree in {:.3}s",
                build_timer.elapsed().as_secs_f32()
            ));

            let route_timer = Instant::now();
            let mut results = {
                let ctx = RouteIterCtx::<H> {
                    netlist: self.netlist,
                    rr: self.rr,
                    opts: &self.opts,
                    itry,
                    pres_fac,
                    crits: &crits,
                    budgets: &self.budgets,
                    worst_neg_slack,
                    trees: &self.trees,
                    congestion: &self.congestion,
                    bbs: &self.bbs,
                    reroute: &self.reroute,
                    routers: &routers,
                    stats: &worker_stats,
                    nets_to_retry: &nets_to_retry,
                    decomp_retries: &self.decomp_retries,
                    status: &self.status,
                    log: &self.log,
                };
                route_partition_tree(&pool, &mut tree, &ctx)
            };
            self.log.log(format!(
                "iteration {itry}: routed all nets in {:.3}s",
                route_timer.elapsed().as_secs_f32()
            ));
            for stats in worker_stats.drain() {
                results.stats.merge(&stats);
            }
            self.stats_total.merge(&results.stats);

            if !results.is_routable {
                // Disconnected routing graph: impossible to route, ever.
                eprintln!("Routing failed: a connection has no path in the routing graph.");
                self.write_debug_log();
                return false;
            }

            // Escalate retried nets: full-device box, no decomposition,
            // routed whole at the tree root next iteration.
            let retry_list = std::mem::take(&mut *nets_to_retry.lock().unwrap());
            for &net in &retry_list {
                self.bbs.set_full_device(net);
                self.decomp_retries[net.index()].store(MAX_DECOMP_REROUTE, Ordering::Relaxed);
                self.log
                    .log(format!("net {net} escalated to a full-device bounding box"));
            }

            let acc_fac = if itry == 1 { 0.0 } else { self.opts.acc_fac };
            let overuse = self.congestion.update_acc_costs(self.rr, acc_fac);
            let used_wirelength = self.congestion.used_wirelength();
            predictor.add_iteration_overuse(itry, overuse.overused_nodes);
            let est_success = predictor.estimate_success_iteration();

            let cpd = self
                .timing
                .map(|_| critical_path_delay(self.netlist, &self.trees));
            let metrics = RoutingMetrics {
                critical_path_delay: cpd,
                used_wirelength,
            };
            let routing_is_feasible = overuse.overused_nodes == 0
                && all_nets_complete(self.netlist, &self.trees, &self.status);

            let cumm_time = run_timer.elapsed().as_secs_f32();
            print_route_status(
                itry,
                cumm_time - prev_cumm_time,
                pres_fac,
                num_bbs_updated,
                &results.stats,
                &overuse,
                used_wirelength,
                available_wirelength,
                cpd,
                est_success,
            );
            prev_cumm_time = cumm_time;

            if self.opts.save_routing_per_iteration {
                self.save_routing_snapshot(itry);
            }

            // Did this iteration converge to a legal routing?
            if retry_list.is_empty()
                && self.is_iteration_complete(routing_is_feasible, worst_neg_slack, rcv_finished_count)
            {
                if metrics.improves_on(best.as_ref().map(|(_, m)| m)) {
                    best = Some((self.trees.snapshot(), metrics));
                    routing_is_successful = true;
                }
                // Relax the congestion penalty so critical connections can
                // take more direct routes on the next pass, and tighten
                // the delay tolerances to re-route more delay-suboptimal
                // connections.
                pres_fac = self.opts.first_iter_pres_fac;
                self.reroute.set_tolerances(0.7, 1.01);
                legal_convergence_count += 1;
                itry_since_last_convergence = 0;
            }

            if itry_since_last_convergence == 1 {
                // first_iter_pres_fac is often zero; restart the growth
                // from a value that multiplies meaningfully.
                pres_fac = self.opts.initial_pres_fac;
            }

            if legal_convergence_count >= self.opts.max_convergence_count
                || (results.stats.connections_routed == 0 && retry_list.is_empty())
                || (routing_is_successful
                    && itry_since_last_convergence > RECONVERGENCE_EXIT_WINDOW)
            {
                break;
            }

            if itry == 1 && !routing_is_successful && available_wirelength > 0 {
                let usage = used_wirelength as f32 / available_wirelength as f32;
                if usage > INIT_WIRELENGTH_ABORT_FRAC {
                    eprintln!(
                        "Routing aborted: first-iteration wirelength usage ({:.0}%) leaves no slack to resolve congestion.",
                        100.0 * usage
                    );
                    break;
                }
            }

            if overuse.overused_nodes > MIN_OVERUSE_FOR_ABORT
                && est_success.is_finite()
                && est_success > abort_threshold
                && self.opts.routing_budgets_algorithm != RoutingBudgetsAlgorithm::Yoyo
            {
                eprintln!(
                    "Routing aborted: the predicted successful iteration ({est_success:.1}) is too high."
                );
                break;
            }

            if itry == 1 && self.opts.exit_after_first_routing_iteration {
                eprintln!("Exiting after first routing iteration as requested.");
                break;
            }

            // Prepare the next iteration.
            num_bbs_updated = if self.opts.route_bb_update == RouteBbUpdate::Dynamic {
                self.dynamic_update_bounding_boxes(&results.rerouted_nets)
            } else {
                0
            };

            if itry as f32 >= congested_iteration_threshold {
                congestion_mode = RouterCongestionMode::Conflicted;
            }

            if itry == 1 {
                pres_fac = self.opts.initial_pres_fac.min(PRES_FAC_MAX);
            } else {
                pres_fac = (pres_fac * self.opts.pres_fac_mult).min(PRES_FAC_MAX);

                if self.budgets.if_set() && itry > 5 && worst_neg_slack != 0.0 {
                    let rcv_finished = self
                        .budgets
                        .increase_min_budgets_if_struggling(BUDGET_INCREASE_AMOUNT, worst_neg_slack);
                    if rcv_finished {
                        rcv_finished_count -= 1;
                    } else {
                        rcv_finished_count = RCV_FINISH_EARLY_COUNTDOWN;
                    }
                }
            }

            if congestion_mode == RouterCongestionMode::Conflicted {
                // Slowly widen the search space so conflicting connections
                // can move out of each other's way.
                if itry_conflicted_mode % BB_SCALE_ITER_COUNT == 0 {
                    bb_fac = bb_fac
                        .saturating_mul(BB_SCALE_FACTOR)
                        .min(self.rr.grid().max_dim());
                    self.bbs.reinflate(self.netlist, bb_fac);
                    self.log
                        .log(format!("conflicted mode: bounding boxes rescaled by {bb_fac}"));
                }
                itry_conflicted_mode += 1;
            }

            if let Some(timing) = self.timing {
                let cpd = cpd.unwrap_or(0.0);
                if itry == 1 {
                    // First iteration pins the lower-bound delays; only
                    // timing was optimized for.
                    self.reroute.set_stable_cpd(cpd);
                    if self.opts.routing_budgets_algorithm == RoutingBudgetsAlgorithm::Yoyo {
                        self.budgets.load(self.netlist, &self.trees, &timing);
                    }
                } else {
                    let should_ripup_for_delay = match self.opts.incr_reroute_delay_ripup {
                        IncrRerouteDelayRipup::On => true,
                        IncrRerouteDelayRipup::Off => false,
                        IncrRerouteDelayRipup::Auto => {
                            congestion_mode == RouterCongestionMode::Normal
                        }
                    };
                    let mut stable_routing_configuration = true;
                    if should_ripup_for_delay
                        && self.reroute.critical_path_delay_grew_significantly(cpd)
                    {
                        stable_routing_configuration = self.reroute.forcibly_reroute_connections(
                            self.netlist,
                            &self.trees,
                            &crits,
                            self.opts.max_criticality,
                        );
                    }
                    if stable_routing_configuration {
                        self.reroute.set_stable_cpd(cpd);
                    }
                }
                crits = Criticalities::from_route_delays(
                    self.netlist,
                    &self.trees,
                    &timing,
                    self.opts.max_criticality,
                    self.opts.criticality_exp,
                );
            }
        }

        if routing_is_successful {
            let (best_trees, best_metrics) = best.expect("success implies a snapshot");
            self.restore_routing(best_trees);
            eprintln!("Restoring best routing.");
            if let Some(cpd) = best_metrics.critical_path_delay {
                eprintln!("Critical path: {cpd:.2}");
            }
            eprintln!(
                "Successfully routed after {} routing iterations.",
                self.iterations_used
            );
        } else {
            let overuse = self.congestion.overuse_info(self.rr);
            eprintln!(
                "Routing failed with {} overused routing resources.",
                overuse.overused_nodes
            );
        }

        let s = &self.stats_total;
        eprintln!(
            "Router stats: nets_routed: {} connections_routed: {} heap_pushes: {} heap_pops: {}",
            s.nets_routed, s.connections_routed, s.heap_pushes, s.heap_pops
        );
        self.write_debug_log();

        routing_is_successful
    }

    fn is_iteration_complete(
        &self,
        routing_is_feasible: bool,
        worst_neg_slack: f32,
        rcv_finished_count: i32,
    ) -> bool {
        if !routing_is_feasible {
            return false;
        }
        let rcv_active = self.opts.routing_budgets_algorithm == RoutingBudgetsAlgorithm::Yoyo
            && self.budgets.if_set();
        !rcv_active || worst_neg_slack == 0.0 || rcv_finished_count <= 0
    }

    /// Grows the boxes of rerouted nets whose routing presses against a
    /// box edge. High-fanout nets are left alone; their boxes are already
    /// large and rescaling them costs run-time.
    fn dynamic_update_bounding_boxes(&mut self, rerouted: &[NetId]) -> usize {
        let full = self.rr.grid().full_bounds();
        let mut updated = 0;
        for &net in rerouted {
            if self.netlist.net_fanout(net) >= self.opts.high_fanout_threshold {
                continue;
            }
            let bb = self.bbs.get(net);
            let guard = self.trees.lock(net);
            let Some(tree) = guard.as_ref() else {
                continue;
            };
            let mut grown = bb;
            for node in tree.rr_nodes() {
                let x = self.rr.node_xlow(node);
                let y = self.rr.node_ylow(node);
                if x == bb.xmin {
                    grown.xmin = (bb.xmin - 1).max(full.xmin);
                }
                if x == bb.xmax {
                    grown.xmax = (bb.xmax + 1).min(full.xmax);
                }
                if y == bb.ymin {
                    grown.ymin = (bb.ymin - 1).max(full.ymin);
                }
                if y == bb.ymax {
                    grown.ymax = (bb.ymax + 1).min(full.ymax);
                }
            }
            drop(guard);
            if grown != bb {
                self.bbs.grow(net, grown);
                updated += 1;
            }
        }
        updated
    }

    /// Swaps in a snapshot, rewriting node occupancies to match it.
    fn restore_routing(&mut self, snapshot: Vec<Option<RouteTree>>) {
        let current = self.trees.snapshot();
        for (cur, new) in current.iter().zip(snapshot.iter()) {
            if let Some(tree) = cur {
                for node in tree.rr_nodes() {
                    self.congestion.remove_use(node);
                }
            }
            if let Some(tree) = new {
                for node in tree.rr_nodes() {
                    self.congestion.add_use(node);
                }
            }
        }
        self.trees.restore(snapshot);
    }

    fn save_routing_snapshot(&self, itry: usize) {
        let path = self.output_dir.join(format!("iteration_{itry:03}.route"));
        match std::fs::File::create(&path) {
            Ok(file) => {
                if let Err(e) = serde_json::to_writer(file, &self.trees.snapshot()) {
                    eprintln!("warning: failed to write {}: {e}", path.display());
                }
            }
            Err(e) => eprintln!("warning: failed to create {}: {e}", path.display()),
        }
    }

    fn write_debug_log(&self) {
        let path = self.output_dir.join(PARTITION_TREE_LOG_FILE);
        if let Err(e) = self.log.write(&path) {
            eprintln!("warning: failed to write {}: {e}", path.display());
        }
    }
}

/// A routing is only legal when, besides being free of overuse, every
/// routable net actually reaches all of its sinks.
fn all_nets_complete(netlist: &Netlist, trees: &RouteTrees, status: &NetStatus) -> bool {
    netlist.nets().all(|net| {
        if netlist.net_is_ignored(net) || status.is_fixed(net) || netlist.net_fanout(net) == 0 {
            return true;
        }
        trees
            .lock(net)
            .as_ref()
            .is_some_and(|tree| tree.is_complete())
    })
}
