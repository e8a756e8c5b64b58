//! Shared foundational types for the weft parallel routing engine.
//!
//! This crate provides the opaque ID newtypes, the 2-D geometry primitives
//! (bounding boxes, cutline axes and sides), and the common result types used
//! by every other crate in the workspace.

#![warn(missing_docs)]

pub mod geom;
pub mod ids;
pub mod result;

pub use geom::{Axis, Bounds, Side};
pub use ids::{NetId, RrNodeId};
pub use result::{InternalError, WeftResult};
