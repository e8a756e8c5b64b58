//! Parallel net routing for the weft place-and-route flow.
//!
//! The router partitions the device along load-balanced cutlines into a
//! tree of disjoint regions, then routes the tree top-down on a
//! work-stealing pool: each node routes the nets straddling its cutline
//! (decomposing the fat ones into two clipped virtual halves for its
//! children) before releasing both children to run concurrently. An outer
//! negotiated-congestion loop grows pressure on overused routing resources
//! until the routing is legal, escalating box-blocked nets to full-device
//! bounding boxes and keeping the best legal routing found.
//!
//! # Usage
//!
//! ```ignore
//! use weft_route::{try_parallel_route, RouterOpts};
//!
//! let ok = try_parallel_route(&netlist, &rr_graph, RouterOpts::default(), None);
//! assert!(ok);
//! ```

#![warn(missing_docs)]

pub mod connection;
pub mod controller;
pub mod debug;
pub mod decompose;
pub mod opts;
pub mod partition;
pub mod route_tree;
pub mod stats;
pub mod timing;

mod net_router;
mod predictor;
mod report;
mod reroute;
mod scheduler;
mod worker;

#[cfg(test)]
mod testutil;

pub use connection::{BinaryHeapQueue, BucketQueue, ConnCostParams, MazeRouter, RouterHeap};
pub use controller::ParallelRouter;
pub use debug::{PartitionTreeLog, PARTITION_TREE_LOG_FILE};
pub use decompose::{VirtualNet, MAX_DECOMP_REROUTE, MIN_DECOMP_BIN_WIDTH};
pub use opts::{
    IncrRerouteDelayRipup, InitialTiming, RouteBbUpdate, RouterHeapKind, RouterOpts,
    RoutingBudgetsAlgorithm, RoutingFailurePredictor,
};
pub use partition::{PartitionTree, PartitionTreeNode};
pub use route_tree::{RouteTree, RouteTrees, RtNode};
pub use stats::RouterStats;
pub use timing::{Criticalities, DelayBudget, RouteBudgets, RoutingMetrics, TimingInfo};

use weft_fabric::{Netlist, RrGraph};

/// Routes every net of `netlist` through `rr` in parallel.
///
/// Returns `true` when a legal routing was found (and left installed in
/// the router's route trees), `false` when the design is unroutable or the
/// run was aborted. This is the top-level contract with the rest of the
/// flow; use [`ParallelRouter`] directly to inspect the resulting routing.
pub fn try_parallel_route(
    netlist: &Netlist,
    rr: &RrGraph,
    opts: RouterOpts,
    timing: Option<TimingInfo>,
) -> bool {
    let mut router = match ParallelRouter::new(netlist, rr, opts) {
        Ok(router) => router,
        Err(e) => {
            eprintln!("error: {e}");
            return false;
        }
    };
    if let Some(timing) = timing {
        router.set_timing(timing);
    }
    router.route()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_fabric::{DeviceGrid, Net};

    #[test]
    fn top_level_entry_routes_a_small_design() {
        let grid = DeviceGrid::new(12, 12).unwrap();
        let mut nl = Netlist::new(grid);
        nl.add_net(Net::new("a", (0, 0), vec![(5, 5), (0, 9)]))
            .unwrap();
        nl.add_net(Net::new("b", (8, 2), vec![(11, 11)])).unwrap();
        nl.add_net(Net::new("clk", (6, 6), vec![(1, 1), (10, 10)]).global())
            .unwrap();
        nl.add_net(Net::new("skip", (3, 3), vec![(4, 4)]).ignored())
            .unwrap();
        let rr = RrGraph::mesh(grid, 2);

        let opts = RouterOpts {
            num_workers: 2,
            ..RouterOpts::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let ok = try_parallel_route(&nl, &rr, opts, None);
        std::env::set_current_dir(prev).unwrap();
        assert!(ok);
    }

    #[test]
    fn invalid_options_fail_cleanly() {
        let grid = DeviceGrid::new(4, 4).unwrap();
        let nl = Netlist::new(grid);
        let rr = RrGraph::mesh(grid, 1);
        let opts = RouterOpts {
            num_workers: 0,
            ..RouterOpts::default()
        };
        assert!(!try_parallel_route(&nl, &rr, opts, None));
    }
}
