//! Router configuration.
//!
//! [`RouterOpts`] collects every knob the routing core recognizes. All
//! fields have defaults, so a configuration file may set only what it needs;
//! the struct deserializes from the project's TOML/JSON configuration in the
//! same way as the rest of the toolchain's config types.

use serde::Deserialize;
use weft_common::{InternalError, WeftResult};

/// Which heap backs the connection routers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterHeapKind {
    /// An exact binary min-heap.
    BinaryHeap,
    /// A bucketed approximation that trades strict ordering for speed.
    BucketHeapApproximation,
}

/// How per-net bounding boxes evolve across iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteBbUpdate {
    /// Boxes stay as loaded (except for retry escalation).
    Static,
    /// Boxes of rerouted nets grow when their routing presses against an
    /// edge.
    Dynamic,
}

/// Whether and how aggressively to predict routing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingFailurePredictor {
    /// Never abort on prediction.
    Off,
    /// Abort when success is predicted far past the iteration limit.
    Safe,
    /// Abort earlier, trading completeness for run-time.
    Aggressive,
}

/// How sink criticalities are seeded on the first iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialTiming {
    /// Treat every connection as fully critical for a min-delay first pass.
    AllCritical,
    /// Estimate criticalities from lookahead distance before any routing
    /// exists.
    Lookahead,
}

/// Whether legal-but-slow connections are ripped up for delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrRerouteDelayRipup {
    /// Always rip up delay-degraded connections.
    On,
    /// Never rip up for delay.
    Off,
    /// Rip up for delay only while congestion is under control.
    Auto,
}

/// The hold-slack budgeting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingBudgetsAlgorithm {
    /// No delay budgets.
    Disabled,
    /// Negotiated min/max delay windows with RCV-style short-path costing.
    Yoyo,
}

/// All options recognized by the parallel routing core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterOpts {
    /// Heap implementation backing the connection routers.
    pub router_heap: RouterHeapKind,
    /// Worker threads in the routing pool.
    pub num_workers: usize,
    /// Maximum number of outer routing iterations.
    pub max_router_iterations: usize,
    /// Stop after this many legal convergences.
    pub max_convergence_count: usize,
    /// Congestion penalty for the first iteration (typically 0).
    pub first_iter_pres_fac: f32,
    /// Congestion penalty for the second iteration.
    pub initial_pres_fac: f32,
    /// Multiplier applied to the congestion penalty each iteration.
    pub pres_fac_mult: f32,
    /// History cost increment per unit of overuse per iteration.
    pub acc_fac: f32,
    /// Initial bounding-box inflation, in grid units per side.
    pub bb_factor: i32,
    /// Bounding-box update policy.
    pub route_bb_update: RouteBbUpdate,
    /// Fanout at and above which a net is treated as high-fanout.
    pub high_fanout_threshold: usize,
    /// Routing failure prediction mode.
    pub routing_failure_predictor: RoutingFailurePredictor,
    /// Fraction of the iteration limit after which the router switches to
    /// conflicted (congestion-focused) mode.
    pub congested_routing_iteration_threshold_frac: f32,
    /// First-iteration criticality seeding.
    pub initial_timing: InitialTiming,
    /// Upper clamp on any sink criticality.
    pub max_criticality: f32,
    /// Exponent shaping the slack-to-criticality curve.
    pub criticality_exp: f32,
    /// Delay-driven rip-up policy.
    pub incr_reroute_delay_ripup: IncrRerouteDelayRipup,
    /// Whether clock nets are routed by a dedicated two-stage pass and must
    /// not be decomposed here.
    pub two_stage_clock_routing: bool,
    /// Hold-slack budgeting algorithm.
    pub routing_budgets_algorithm: RoutingBudgetsAlgorithm,
    /// Whether the design contains choking spots (only meaningful to flat
    /// intra-cluster connection routers; recognized for config parity).
    pub has_choking_spot: bool,
    /// Write a JSON snapshot of all route trees after every iteration.
    pub save_routing_per_iteration: bool,
    /// Stop after the first iteration regardless of outcome (debug).
    pub exit_after_first_routing_iteration: bool,
    /// Weight of the distance-to-target estimate in the connection search.
    pub astar_fac: f32,
}

impl Default for RouterOpts {
    fn default() -> Self {
        Self {
            router_heap: RouterHeapKind::BinaryHeap,
            num_workers: 4,
            max_router_iterations: 50,
            max_convergence_count: 1,
            first_iter_pres_fac: 0.0,
            initial_pres_fac: 0.5,
            pres_fac_mult: 1.3,
            acc_fac: 1.0,
            bb_factor: 3,
            route_bb_update: RouteBbUpdate::Static,
            high_fanout_threshold: 64,
            routing_failure_predictor: RoutingFailurePredictor::Safe,
            congested_routing_iteration_threshold_frac: 1.0,
            initial_timing: InitialTiming::AllCritical,
            max_criticality: 0.99,
            criticality_exp: 1.0,
            incr_reroute_delay_ripup: IncrRerouteDelayRipup::Auto,
            two_stage_clock_routing: false,
            routing_budgets_algorithm: RoutingBudgetsAlgorithm::Disabled,
            has_choking_spot: false,
            save_routing_per_iteration: false,
            exit_after_first_routing_iteration: false,
            astar_fac: 1.2,
        }
    }
}

impl RouterOpts {
    /// Checks the options for internally inconsistent values.
    pub fn validate(&self) -> WeftResult<()> {
        if self.num_workers == 0 {
            return Err(InternalError::new("num_workers must be at least 1"));
        }
        if self.max_router_iterations == 0 {
            return Err(InternalError::new(
                "max_router_iterations must be at least 1",
            ));
        }
        if self.pres_fac_mult < 1.0 {
            return Err(InternalError::new(
                "pres_fac_mult below 1.0 would relax congestion penalties",
            ));
        }
        if self.bb_factor < 0 {
            return Err(InternalError::new("bb_factor must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.max_criticality) {
            return Err(InternalError::new("max_criticality must be within [0, 1]"));
        }
        if self.congested_routing_iteration_threshold_frac < 0.0 {
            return Err(InternalError::new(
                "congested_routing_iteration_threshold_frac must be non-negative",
            ));
        }
        Ok(())
    }
}
