//! Errors raised while constructing the device or netlist model.

use weft_common::NetId;

/// An error constructing or validating fabric-side data.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    /// A device grid dimension was zero or negative.
    #[error("device grid must be at least 1x1, got {width}x{height}")]
    EmptyDevice {
        /// Requested grid width.
        width: i32,
        /// Requested grid height.
        height: i32,
    },

    /// A net terminal lies outside the device grid.
    #[error("net {net} has a terminal at ({x},{y}) outside the {width}x{height} device")]
    TerminalOutsideDevice {
        /// The offending net.
        net: NetId,
        /// Terminal column.
        x: i32,
        /// Terminal row.
        y: i32,
        /// Device width.
        width: i32,
        /// Device height.
        height: i32,
    },
}
