//! The netlist adapter surface consumed by the routing core.
//!
//! A [`Net`] is a signal routed from one source terminal to zero or more
//! sink terminals, all placed at grid coordinates. The [`Netlist`] validates
//! terminals against the device grid on insertion and exposes the accessor
//! API the router uses: net iteration, sink access, fanout, and the
//! global/ignored flags.

use crate::error::FabricError;
use crate::grid::DeviceGrid;
use serde::{Deserialize, Serialize};
use weft_common::{Bounds, NetId};

/// A signal to be routed from its source terminal to its sink terminals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    /// The net name, for reports and debug logs.
    pub name: String,
    /// Grid coordinate of the source (driver) terminal.
    pub source: (i32, i32),
    /// Grid coordinates of the sink terminals.
    pub sinks: Vec<(i32, i32)>,
    /// Whether this is a global (clock-like) net.
    pub is_global: bool,
    /// Whether the router should skip this net entirely.
    pub is_ignored: bool,
}

impl Net {
    /// Creates an ordinary signal net.
    pub fn new(name: impl Into<String>, source: (i32, i32), sinks: Vec<(i32, i32)>) -> Self {
        Self {
            name: name.into(),
            source,
            sinks,
            is_global: false,
            is_ignored: false,
        }
    }

    /// Marks the net as global (clock-like).
    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    /// Marks the net as ignored by the router.
    pub fn ignored(mut self) -> Self {
        self.is_ignored = true;
        self
    }

    /// The smallest box enclosing every terminal of the net.
    pub fn terminal_bounds(&self) -> Bounds {
        let mut bb = Bounds::point(self.source.0, self.source.1);
        for &(x, y) in &self.sinks {
            bb.expand_to(x, y);
        }
        bb
    }
}

/// The set of nets to route, validated against a device grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Netlist {
    grid: DeviceGrid,
    nets: Vec<Net>,
}

impl Netlist {
    /// Creates an empty netlist over the given device grid.
    pub fn new(grid: DeviceGrid) -> Self {
        Self {
            grid,
            nets: Vec::new(),
        }
    }

    /// The device grid this netlist is placed on.
    pub fn grid(&self) -> DeviceGrid {
        self.grid
    }

    /// Adds a net, validating that every terminal lies on the device.
    pub fn add_net(&mut self, net: Net) -> Result<NetId, FabricError> {
        let id = NetId::from_raw(self.nets.len() as u32);
        let terminals = std::iter::once(net.source).chain(net.sinks.iter().copied());
        for (x, y) in terminals {
            if !self.grid.contains(x, y) {
                return Err(FabricError::TerminalOutsideDevice {
                    net: id,
                    x,
                    y,
                    width: self.grid.width(),
                    height: self.grid.height(),
                });
            }
        }
        self.nets.push(net);
        Ok(id)
    }

    /// Iterates over all net IDs.
    pub fn nets(&self) -> impl Iterator<Item = NetId> + '_ {
        (0..self.nets.len() as u32).map(NetId::from_raw)
    }

    /// Number of nets in the netlist.
    pub fn len(&self) -> usize {
        self.nets.len()
    }

    /// Returns whether the netlist has no nets.
    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    /// Full access to a net's record.
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    /// The sink terminal coordinates of a net.
    pub fn net_sinks(&self, id: NetId) -> &[(i32, i32)] {
        &self.nets[id.index()].sinks
    }

    /// The fanout (number of sinks) of a net.
    pub fn net_fanout(&self, id: NetId) -> usize {
        self.nets[id.index()].sinks.len()
    }

    /// The number of pins of a net (driver plus sinks).
    pub fn net_pin_count(&self, id: NetId) -> usize {
        self.net_fanout(id) + 1
    }

    /// Whether the router should skip this net.
    pub fn net_is_ignored(&self, id: NetId) -> bool {
        self.nets[id.index()].is_ignored
    }

    /// Whether this is a global (clock-like) net.
    pub fn net_is_global(&self, id: NetId) -> bool {
        self.nets[id.index()].is_global
    }
}
