//! Shared fixtures for the in-crate tests.

use crate::connection::{BinaryHeapQueue, MazeRouter};
use crate::debug::PartitionTreeLog;
use crate::net_router::RouteIterCtx;
use crate::opts::RouterOpts;
use crate::reroute::{NetStatus, ReroutePolicy};
use crate::route_tree::RouteTrees;
use crate::stats::RouterStats;
use crate::timing::{Criticalities, RouteBudgets};
use crate::worker::WorkerLocal;
use std::sync::atomic::AtomicUsize;
use std::sync::Mutex;
use weft_common::NetId;
use weft_fabric::{CongestionCosts, Netlist, RouteBbs, RrGraph};

/// Owns one iteration's worth of routing state for driver-level tests.
pub(crate) struct Harness {
    pub netlist: Netlist,
    pub rr: RrGraph,
    pub opts: RouterOpts,
    pub itry: usize,
    pub pres_fac: f32,
    pub worst_neg_slack: f32,
    pub crits: Criticalities,
    pub budgets: RouteBudgets,
    pub trees: RouteTrees,
    pub congestion: CongestionCosts,
    pub bbs: RouteBbs,
    pub reroute: ReroutePolicy,
    pub routers: WorkerLocal<MazeRouter<BinaryHeapQueue>>,
    pub stats: WorkerLocal<RouterStats>,
    pub nets_to_retry: Mutex<Vec<NetId>>,
    pub decomp_retries: Vec<AtomicUsize>,
    pub status: NetStatus,
    pub log: PartitionTreeLog,
}

impl Harness {
    /// Builds routing state over a mesh of the given capacity, with tight
    /// bounding boxes (`bb_factor` 0) and two workers.
    pub(crate) fn new(netlist: Netlist, capacity: u32) -> Self {
        let rr = RrGraph::mesh(netlist.grid(), capacity);
        let opts = RouterOpts {
            num_workers: 2,
            bb_factor: 0,
            ..RouterOpts::default()
        };
        let num_nets = netlist.len();
        let crits = Criticalities::constant(&netlist, 0.5);
        let budgets = RouteBudgets::disabled(&netlist);
        let bbs = RouteBbs::load(&netlist, opts.bb_factor);
        let reroute = ReroutePolicy::new(&netlist);
        let congestion = CongestionCosts::new(rr.num_nodes());
        let routers = WorkerLocal::new(opts.num_workers);
        let stats = WorkerLocal::new(opts.num_workers);
        Self {
            netlist,
            rr,
            opts,
            itry: 1,
            pres_fac: 0.5,
            worst_neg_slack: 0.0,
            crits,
            budgets,
            trees: RouteTrees::new(num_nets),
            congestion,
            bbs,
            reroute,
            routers,
            stats,
            nets_to_retry: Mutex::new(Vec::new()),
            decomp_retries: (0..num_nets).map(|_| AtomicUsize::new(0)).collect(),
            status: NetStatus::new(num_nets),
            log: PartitionTreeLog::new(),
        }
    }

    /// Turns the nodes in column `x`, rows `y0..=y1`, into obstructions.
    pub(crate) fn block_column(&mut self, x: i32, y0: i32, y1: i32) {
        for y in y0..=y1 {
            let node = self.rr.node_at(x, y);
            self.rr.set_capacity(node, 0);
        }
    }

    /// Borrows the state as one iteration context.
    pub(crate) fn ctx(&self) -> RouteIterCtx<'_, BinaryHeapQueue> {
        RouteIterCtx {
            netlist: &self.netlist,
            rr: &self.rr,
            opts: &self.opts,
            itry: self.itry,
            pres_fac: self.pres_fac,
            crits: &self.crits,
            budgets: &self.budgets,
            worst_neg_slack: self.worst_neg_slack,
            trees: &self.trees,
            congestion: &self.congestion,
            bbs: &self.bbs,
            reroute: &self.reroute,
            routers: &self.routers,
            stats: &self.stats,
            nets_to_retry: &self.nets_to_retry,
            decomp_retries: &self.decomp_retries,
            status: &self.status,
            log: &self.log,
        }
    }
}
