//! Criticalities, delay budgets and routing quality metrics.
//!
//! The routing core does not run a full timing analyzer; it consumes per-sink
//! criticalities derived from the previous iteration's routed delays against
//! a target clock period. On the first iteration, criticalities are seeded
//! per [`InitialTiming`](crate::opts::InitialTiming): all-critical, or a
//! lookahead estimate from terminal distance.

use crate::route_tree::RouteTrees;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use weft_common::NetId;
use weft_fabric::Netlist;

/// Timing context for a timing-driven routing run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingInfo {
    /// Target clock period, in the same delay units as RR node base costs.
    pub clock_period: f32,
}

/// Maps a source-to-sink delay to a criticality in `[0, max_criticality]`.
fn criticality_of_delay(delay: f32, period: f32, max_criticality: f32, exp: f32) -> f32 {
    let ratio = (delay / period).clamp(0.0, 1.0);
    ratio.powf(exp).min(max_criticality)
}

/// Per-sink criticalities for one routing iteration.
#[derive(Debug, Clone)]
pub struct Criticalities {
    per_net: Vec<Vec<f32>>,
}

impl Criticalities {
    /// The same criticality for every connection (1.0 for a min-delay
    /// first pass, 0.0 for routability-driven routing).
    pub fn constant(netlist: &Netlist, value: f32) -> Self {
        Self {
            per_net: netlist
                .nets()
                .map(|net| vec![value; netlist.net_fanout(net)])
                .collect(),
        }
    }

    /// Estimates criticalities from terminal Manhattan distance before any
    /// routing exists.
    pub fn lookahead(netlist: &Netlist, timing: &TimingInfo, max_crit: f32, exp: f32) -> Self {
        let per_net = netlist
            .nets()
            .map(|net| {
                let (sx, sy) = netlist.net(net).source;
                netlist
                    .net_sinks(net)
                    .iter()
                    .map(|&(x, y)| {
                        let est = ((x - sx).abs() + (y - sy).abs()) as f32;
                        criticality_of_delay(est, timing.clock_period, max_crit, exp)
                    })
                    .collect()
            })
            .collect();
        Self { per_net }
    }

    /// Computes criticalities from the delays of the current routing.
    /// Unreached sinks are treated as fully critical.
    pub fn from_route_delays(
        netlist: &Netlist,
        trees: &RouteTrees,
        timing: &TimingInfo,
        max_crit: f32,
        exp: f32,
    ) -> Self {
        let per_net = netlist
            .nets()
            .map(|net| {
                let guard = trees.lock(net);
                (0..netlist.net_fanout(net))
                    .map(|isink| match guard.as_ref().and_then(|t| t.sink_delay(isink)) {
                        Some(delay) => {
                            criticality_of_delay(delay, timing.clock_period, max_crit, exp)
                        }
                        None => max_crit,
                    })
                    .collect()
            })
            .collect();
        Self { per_net }
    }

    /// The criticality of one connection.
    pub fn criticality(&self, net: NetId, isink: usize) -> f32 {
        self.per_net[net.index()][isink]
    }
}

/// Quality metrics of a complete legal routing, used to compare
/// convergences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingMetrics {
    /// Worst source-to-sink delay, when timing is enabled.
    pub critical_path_delay: Option<f32>,
    /// Total wirelength in use.
    pub used_wirelength: u64,
}

impl RoutingMetrics {
    /// Whether this routing beats `best` (shorter critical path first,
    /// then less wirelength). Anything beats no routing at all.
    pub fn improves_on(&self, best: Option<&RoutingMetrics>) -> bool {
        let Some(best) = best else { return true };
        match (self.critical_path_delay, best.critical_path_delay) {
            (Some(a), Some(b)) if a != b => a < b,
            _ => self.used_wirelength < best.used_wirelength,
        }
    }
}

/// The critical-path delay of the current routing: the worst reached-sink
/// delay across all nets.
pub fn critical_path_delay(netlist: &Netlist, trees: &RouteTrees) -> f32 {
    let mut worst = 0.0_f32;
    for net in netlist.nets() {
        if let Some(tree) = trees.lock(net).as_ref() {
            for (_, delay) in tree.reached_isinks() {
                worst = worst.max(delay);
            }
        }
    }
    worst
}

/// A per-connection delay window for hold-slack budgeting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayBudget {
    /// Shortest acceptable delay (hold bound).
    pub min_delay: f32,
    /// Delay the router should aim for.
    pub target_delay: f32,
    /// Longest acceptable delay (setup bound).
    pub max_delay: f32,
    /// Weight of the short-path penalty in the cost function.
    pub short_path_criticality: f32,
}

/// Optional per-connection delay budgets (the YOYO algorithm).
#[derive(Debug)]
pub struct RouteBudgets {
    windows: Vec<Vec<DelayBudget>>,
    should_reroute: Vec<AtomicBool>,
    set: bool,
}

impl RouteBudgets {
    /// Budgets disabled: every query returns `None`.
    pub fn disabled(netlist: &Netlist) -> Self {
        Self {
            windows: Vec::new(),
            should_reroute: netlist.nets().map(|_| AtomicBool::new(false)).collect(),
            set: false,
        }
    }

    /// Whether budgets have been loaded.
    pub fn if_set(&self) -> bool {
        self.set
    }

    /// Loads budgets from the uncongested delays of the current routing:
    /// the window spans half the measured delay up to the clock period.
    pub fn load(&mut self, netlist: &Netlist, trees: &RouteTrees, timing: &TimingInfo) {
        self.windows = netlist
            .nets()
            .map(|net| {
                let guard = trees.lock(net);
                (0..netlist.net_fanout(net))
                    .map(|isink| {
                        let measured = guard
                            .as_ref()
                            .and_then(|t| t.sink_delay(isink))
                            .unwrap_or(timing.clock_period);
                        DelayBudget {
                            min_delay: measured * 0.5,
                            target_delay: measured,
                            max_delay: timing.clock_period.max(measured),
                            short_path_criticality: 1.0,
                        }
                    })
                    .collect()
            })
            .collect();
        self.set = true;
    }

    /// The budget window for one connection, when budgets are loaded.
    pub fn budget(&self, net: NetId, isink: usize) -> Option<DelayBudget> {
        if self.set {
            Some(self.windows[net.index()][isink])
        } else {
            None
        }
    }

    /// Whether a net was flagged for a hold-driven reroute.
    pub fn get_should_reroute(&self, net: NetId) -> bool {
        self.should_reroute[net.index()].load(Ordering::Relaxed)
    }

    /// Flags or clears a hold-driven reroute for a net.
    pub fn set_should_reroute(&self, net: NetId, value: bool) {
        self.should_reroute[net.index()].store(value, Ordering::Relaxed);
    }

    /// The worst hold slack of the current routing: the most negative
    /// `delay - min_delay` over all reached sinks, clamped to zero when no
    /// connection violates its hold bound.
    pub fn hold_worst_negative_slack(&self, netlist: &Netlist, trees: &RouteTrees) -> f32 {
        if !self.set {
            return 0.0;
        }
        let mut wns = 0.0_f32;
        for net in netlist.nets() {
            if let Some(tree) = trees.lock(net).as_ref() {
                for (isink, delay) in tree.reached_isinks() {
                    let slack = delay - self.windows[net.index()][isink].min_delay;
                    if slack < 0.0 {
                        self.set_should_reroute(net, true);
                        if slack < wns {
                            wns = slack;
                        }
                    }
                }
            }
        }
        wns
    }

    /// Relaxes the hold bounds of struggling connections. Returns `true`
    /// when hold slack is already resolved and the budgets are finished.
    pub fn increase_min_budgets_if_struggling(&mut self, amount: f32, wns: f32) -> bool {
        if wns >= 0.0 {
            return true;
        }
        for net_windows in &mut self.windows {
            for w in net_windows.iter_mut() {
                w.min_delay = (w.min_delay - amount).max(0.0);
                w.max_delay += amount;
            }
        }
        false
    }
}
