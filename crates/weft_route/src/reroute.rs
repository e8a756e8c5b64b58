//! Connection-based reroute policy and per-net status flags.
//!
//! Tracks the best (lower-bound) delay ever achieved per connection and the
//! stable critical-path delay. When the critical path grows significantly
//! and delay-driven rip-up is allowed, nets whose critical connections have
//! degraded past the configured tolerances are flagged for a forced
//! reroute on the next iteration.

use crate::route_tree::RouteTrees;
use crate::timing::Criticalities;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use weft_common::NetId;
use weft_fabric::Netlist;

/// Relative critical-path growth treated as significant.
const CPD_GROWTH_TOLERANCE: f32 = 1.02;

/// Per-net routed/fixed flags, reset at the start of every iteration.
#[derive(Debug)]
pub(crate) struct NetStatus {
    routed: Vec<AtomicBool>,
    fixed: Vec<AtomicBool>,
}

impl NetStatus {
    pub(crate) fn new(num_nets: usize) -> Self {
        Self {
            routed: (0..num_nets).map(|_| AtomicBool::new(false)).collect(),
            fixed: (0..num_nets).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub(crate) fn reset_routed(&mut self) {
        for flag in &mut self.routed {
            *flag.get_mut() = false;
        }
    }

    pub(crate) fn is_routed(&self, net: NetId) -> bool {
        self.routed[net.index()].load(Ordering::Relaxed)
    }

    pub(crate) fn set_routed(&self, net: NetId, value: bool) {
        self.routed[net.index()].store(value, Ordering::Relaxed);
    }

    pub(crate) fn is_fixed(&self, net: NetId) -> bool {
        self.fixed[net.index()].load(Ordering::Relaxed)
    }

    /// Marks a net as pre-routed; the router will never touch it.
    pub(crate) fn set_fixed(&self, net: NetId, value: bool) {
        self.fixed[net.index()].store(value, Ordering::Relaxed);
    }
}

/// Lower-bound connection delays and delay-driven forced-reroute marks.
#[derive(Debug)]
pub(crate) struct ReroutePolicy {
    lower_bounds: Vec<Mutex<Vec<f32>>>,
    forced: Vec<AtomicBool>,
    stable_cpd: f32,
    criticality_tolerance: f32,
    delay_tolerance: f32,
}

impl ReroutePolicy {
    pub(crate) fn new(netlist: &Netlist) -> Self {
        Self {
            lower_bounds: netlist
                .nets()
                .map(|net| Mutex::new(vec![f32::INFINITY; netlist.net_fanout(net)]))
                .collect(),
            forced: netlist.nets().map(|_| AtomicBool::new(false)).collect(),
            stable_cpd: f32::INFINITY,
            criticality_tolerance: 0.9,
            delay_tolerance: 1.1,
        }
    }

    /// Lowers the recorded best delay for a connection.
    pub(crate) fn update_lower_bound(&self, net: NetId, isink: usize, delay: f32) {
        let mut bounds = self.lower_bounds[net.index()].lock().unwrap();
        if delay < bounds[isink] {
            bounds[isink] = delay;
        }
    }

    pub(crate) fn is_forced(&self, net: NetId) -> bool {
        self.forced[net.index()].load(Ordering::Relaxed)
    }

    pub(crate) fn set_forced(&self, net: NetId, value: bool) {
        self.forced[net.index()].store(value, Ordering::Relaxed);
    }

    /// Records the critical-path delay of a stable routing configuration.
    pub(crate) fn set_stable_cpd(&mut self, cpd: f32) {
        self.stable_cpd = cpd;
    }

    /// Tightens the reroute tolerances (done after a legal convergence so
    /// more delay-suboptimal connections get another chance).
    pub(crate) fn set_tolerances(&mut self, criticality: f32, delay: f32) {
        self.criticality_tolerance = criticality;
        self.delay_tolerance = delay;
    }

    pub(crate) fn critical_path_delay_grew_significantly(&self, cpd: f32) -> bool {
        self.stable_cpd.is_finite() && cpd > self.stable_cpd * CPD_GROWTH_TOLERANCE
    }

    /// Flags nets whose critical connections have degraded past tolerance.
    /// Returns `true` when the configuration is stable (nothing flagged).
    pub(crate) fn forcibly_reroute_connections(
        &self,
        netlist: &Netlist,
        trees: &RouteTrees,
        crits: &Criticalities,
        max_criticality: f32,
    ) -> bool {
        let mut stable = true;
        for net in netlist.nets() {
            let guard = trees.lock(net);
            let Some(tree) = guard.as_ref() else { continue };
            let bounds = self.lower_bounds[net.index()].lock().unwrap();
            for (isink, delay) in tree.reached_isinks() {
                let critical =
                    crits.criticality(net, isink) >= max_criticality * self.criticality_tolerance;
                let degraded = bounds[isink].is_finite() && delay > bounds[isink] * self.delay_tolerance;
                if critical && degraded {
                    self.set_forced(net, true);
                    stable = false;
                    break;
                }
            }
        }
        stable
    }
}
