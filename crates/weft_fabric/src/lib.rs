//! Device-side environment for the weft parallel routing engine.
//!
//! This crate models everything the routing core consumes from the device
//! and the design under route:
//!
//! - [`DeviceGrid`]: the 2-D device extent
//! - [`RrGraph`]: the routing-resource graph with per-node coordinates,
//!   base costs and capacities
//! - [`Netlist`] / [`Net`]: the netlist adapter surface (sources, sinks,
//!   global/ignored flags)
//! - [`CongestionCosts`]: shared congestion state negotiated across
//!   routing iterations
//! - [`RouteBbs`]: the mutable per-net bounding-box store

#![warn(missing_docs)]

pub mod bbs;
pub mod congestion;
pub mod error;
pub mod grid;
pub mod netlist;
pub mod rr;

pub use bbs::RouteBbs;
pub use congestion::{CongestionCosts, OveruseInfo};
pub use error::FabricError;
pub use grid::DeviceGrid;
pub use netlist::{Net, Netlist};
pub use rr::RrGraph;
