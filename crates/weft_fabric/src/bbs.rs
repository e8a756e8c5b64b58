//! The mutable per-net bounding-box store.
//!
//! Every net carries a routing bounding box that the connection routers
//! treat as a hard search frontier. Boxes start as the net's terminal box
//! inflated by the configured factor and only ever grow: dynamic updates
//! union in new territory, conflicted-mode reloads union in the larger
//! inflation, and retry escalation widens a box to the whole device.

use crate::grid::DeviceGrid;
use crate::netlist::Netlist;
use weft_common::{Bounds, NetId};

/// Per-net routing bounding boxes.
#[derive(Debug, Clone)]
pub struct RouteBbs {
    grid: DeviceGrid,
    bbs: Vec<Bounds>,
}

impl RouteBbs {
    /// Loads a box for every net: the terminal box inflated by `bb_factor`
    /// on each side, clamped to the device.
    pub fn load(netlist: &Netlist, bb_factor: i32) -> Self {
        let grid = netlist.grid();
        let clip = grid.full_bounds();
        let bbs = netlist
            .nets()
            .map(|net| {
                netlist
                    .net(net)
                    .terminal_bounds()
                    .inflated(bb_factor, &clip)
            })
            .collect();
        Self { grid, bbs }
    }

    /// The current routing box of a net.
    pub fn get(&self, net: NetId) -> Bounds {
        self.bbs[net.index()]
    }

    /// Whether a net's box already covers the whole device.
    pub fn is_full_device(&self, net: NetId) -> bool {
        self.bbs[net.index()] == self.grid.full_bounds()
    }

    /// Widens a net's box to the whole device.
    pub fn set_full_device(&mut self, net: NetId) {
        self.bbs[net.index()] = self.grid.full_bounds();
    }

    /// Grows a net's box to also cover `bb`. Boxes never shrink.
    pub fn grow(&mut self, net: NetId, bb: Bounds) {
        let slot = &mut self.bbs[net.index()];
        *slot = slot.union(&bb);
    }

    /// Re-inflates every box with a larger factor, keeping previous growth:
    /// the stored box becomes the union of itself and the fresh inflation.
    pub fn reinflate(&mut self, netlist: &Netlist, bb_factor: i32) {
        let clip = self.grid.full_bounds();
        for net in netlist.nets() {
            let fresh = netlist
                .net(net)
                .terminal_bounds()
                .inflated(bb_factor, &clip);
            self.grow(net, fresh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::Net;

    fn netlist() -> Netlist {
        let mut nl = Netlist::new(DeviceGrid::new(10, 10).unwrap());
        nl.add_net(Net::new("a", (4, 4), vec![(6, 5)])).unwrap();
        nl.add_net(Net::new("b", (0, 0), vec![(9, 9)])).unwrap();
        nl
    }

    #[test]
    fn load_inflates_and_clamps() {
        let nl = netlist();
        let bbs = RouteBbs::load(&nl, 1);
        assert_eq!(bbs.get(NetId::from_raw(0)), Bounds::new(3, 3, 7, 6));
        // Already spans the device; inflation clamps.
        assert_eq!(bbs.get(NetId::from_raw(1)), Bounds::new(0, 0, 9, 9));
        assert!(bbs.is_full_device(NetId::from_raw(1)));
    }

    #[test]
    fn set_full_device() {
        let nl = netlist();
        let mut bbs = RouteBbs::load(&nl, 0);
        let a = NetId::from_raw(0);
        assert!(!bbs.is_full_device(a));
        bbs.set_full_device(a);
        assert_eq!(bbs.get(a), Bounds::new(0, 0, 9, 9));
    }

    #[test]
    fn growth_is_monotonic() {
        let nl = netlist();
        let mut bbs = RouteBbs::load(&nl, 0);
        let a = NetId::from_raw(0);
        let before = bbs.get(a);
        bbs.grow(a, Bounds::new(2, 4, 6, 5));
        assert!(bbs.get(a).contains_bounds(&before));

        bbs.set_full_device(a);
        // A reinflate with a small factor must not shrink the box back.
        bbs.reinflate(&nl, 1);
        assert!(bbs.is_full_device(a));
    }

    #[test]
    fn reinflate_grows_with_factor() {
        let nl = netlist();
        let mut bbs = RouteBbs::load(&nl, 0);
        let a = NetId::from_raw(0);
        bbs.reinflate(&nl, 2);
        assert_eq!(bbs.get(a), Bounds::new(2, 2, 8, 7));
    }
}
