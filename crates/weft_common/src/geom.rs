//! 2-D geometry primitives for the device grid.
//!
//! A [`Bounds`] is an axis-aligned bounding box whose four edges are all
//! *inclusive*: a box with `xmin == xmax` is one column wide. Cutlines run
//! between grid coordinates: a cutline on [`Axis::X`] at position `pos` sits
//! at `x = pos + 0.5`, so the low side keeps every coordinate `<= pos` and
//! the high side keeps every coordinate `> pos`.

use serde::{Deserialize, Serialize};

/// The axis a cutline is perpendicular to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// A vertical cutline: partitions space by x coordinate.
    X,
    /// A horizontal cutline: partitions space by y coordinate.
    Y,
}

/// One side of a cutline.
///
/// `Low` is the lower-coordinate side (left of a vertical cutline, below a
/// horizontal one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The side with coordinates `<= pos`.
    Low,
    /// The side with coordinates `> pos`.
    High,
}

impl Side {
    /// Returns the other side of the cutline.
    pub fn opposite(self) -> Side {
        match self {
            Side::Low => Side::High,
            Side::High => Side::Low,
        }
    }

    /// Classifies a single coordinate against a cutline at `pos + 0.5`.
    pub fn of_coord(coord: i32, pos: i32) -> Side {
        if coord > pos {
            Side::High
        } else {
            Side::Low
        }
    }
}

/// An axis-aligned bounding box, inclusive on all four edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    /// Leftmost column covered by the box.
    pub xmin: i32,
    /// Bottom row covered by the box.
    pub ymin: i32,
    /// Rightmost column covered by the box.
    pub xmax: i32,
    /// Top row covered by the box.
    pub ymax: i32,
}

impl Bounds {
    /// Creates a box from its inclusive corner coordinates.
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Creates a degenerate box covering the single point `(x, y)`.
    pub fn point(x: i32, y: i32) -> Self {
        Self::new(x, y, x, y)
    }

    /// Width in columns (inclusive edges, so at least 1 for a valid box).
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin + 1
    }

    /// Height in rows (inclusive edges, so at least 1 for a valid box).
    pub fn height(&self) -> i32 {
        self.ymax - self.ymin + 1
    }

    /// Returns whether the point `(x, y)` lies inside the box.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Returns whether this box fully contains `other`.
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        self.xmin <= other.xmin
            && self.ymin <= other.ymin
            && self.xmax >= other.xmax
            && self.ymax >= other.ymax
    }

    /// Grows the box to include the point `(x, y)`.
    pub fn expand_to(&mut self, x: i32, y: i32) {
        self.xmin = self.xmin.min(x);
        self.ymin = self.ymin.min(y);
        self.xmax = self.xmax.max(x);
        self.ymax = self.ymax.max(y);
    }

    /// Returns the union of two boxes.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            xmin: self.xmin.min(other.xmin),
            ymin: self.ymin.min(other.ymin),
            xmax: self.xmax.max(other.xmax),
            ymax: self.ymax.max(other.ymax),
        }
    }

    /// Inflates the box by `margin` on every side, then clamps it to `clip`.
    pub fn inflated(&self, margin: i32, clip: &Bounds) -> Bounds {
        Bounds {
            xmin: (self.xmin - margin).max(clip.xmin),
            ymin: (self.ymin - margin).max(clip.ymin),
            xmax: (self.xmax + margin).min(clip.xmax),
            ymax: (self.ymax + margin).min(clip.ymax),
        }
    }

    /// The low edge of the box along `axis`.
    pub fn low_edge(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.xmin,
            Axis::Y => self.ymin,
        }
    }

    /// The high edge of the box along `axis`.
    pub fn high_edge(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.xmax,
            Axis::Y => self.ymax,
        }
    }

    /// Classifies the box against a cutline at `axis = pos + 0.5`.
    ///
    /// Returns `Some(Side::Low)` if the whole box lies at coordinates
    /// `<= pos`, `Some(Side::High)` if it lies entirely at `> pos`, and
    /// `None` if it straddles the cutline.
    pub fn side_of_cutline(&self, axis: Axis, pos: i32) -> Option<Side> {
        if self.high_edge(axis) <= pos {
            Some(Side::Low)
        } else if self.low_edge(axis) > pos {
            Some(Side::High)
        } else {
            None
        }
    }

    /// Clips the box to one side of a cutline at `axis = pos + 0.5`.
    ///
    /// The low side keeps coordinates `<= pos`; the high side keeps
    /// coordinates `> pos`. The two clipped halves of a straddling box tile
    /// it exactly.
    pub fn clipped_to_side(&self, axis: Axis, pos: i32, side: Side) -> Bounds {
        let mut out = *self;
        match (axis, side) {
            (Axis::X, Side::Low) => out.xmax = pos,
            (Axis::X, Side::High) => out.xmin = pos + 1,
            (Axis::Y, Side::Low) => out.ymax = pos,
            (Axis::Y, Side::High) => out.ymin = pos + 1,
        }
        out
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_height_inclusive() {
        let bb = Bounds::new(2, 3, 5, 3);
        assert_eq!(bb.width(), 4);
        assert_eq!(bb.height(), 1);
    }

    #[test]
    fn point_box() {
        let bb = Bounds::point(4, 7);
        assert_eq!(bb.width(), 1);
        assert!(bb.contains(4, 7));
        assert!(!bb.contains(4, 8));
    }

    #[test]
    fn contains_edges() {
        let bb = Bounds::new(0, 0, 9, 9);
        assert!(bb.contains(0, 0));
        assert!(bb.contains(9, 9));
        assert!(!bb.contains(10, 9));
        assert!(!bb.contains(-1, 0));
    }

    #[test]
    fn expand_to_grows() {
        let mut bb = Bounds::point(5, 5);
        bb.expand_to(2, 8);
        assert_eq!(bb, Bounds::new(2, 5, 5, 8));
    }

    #[test]
    fn union_covers_both() {
        let a = Bounds::new(0, 0, 2, 2);
        let b = Bounds::new(4, 1, 6, 5);
        let u = a.union(&b);
        assert!(u.contains_bounds(&a));
        assert!(u.contains_bounds(&b));
        assert_eq!(u, Bounds::new(0, 0, 6, 5));
    }

    #[test]
    fn inflate_clamps_to_clip() {
        let clip = Bounds::new(0, 0, 9, 9);
        let bb = Bounds::new(1, 1, 8, 8).inflated(3, &clip);
        assert_eq!(bb, clip);
    }

    #[test]
    fn side_of_cutline_classification() {
        let bb = Bounds::new(0, 0, 4, 9);
        // Cutline at x = 4.5: the box lies entirely on the low side.
        assert_eq!(bb.side_of_cutline(Axis::X, 4), Some(Side::Low));
        // Cutline at x = 3.5: xmax = 4 is on the high side, so it straddles.
        assert_eq!(bb.side_of_cutline(Axis::X, 3), None);
        let high = Bounds::new(5, 0, 9, 9);
        assert_eq!(high.side_of_cutline(Axis::X, 4), Some(Side::High));
        assert_eq!(high.side_of_cutline(Axis::Y, 4), None);
    }

    #[test]
    fn clipped_halves_tile_the_box() {
        let bb = Bounds::new(0, 0, 9, 9);
        for pos in 0..9 {
            let low = bb.clipped_to_side(Axis::X, pos, Side::Low);
            let high = bb.clipped_to_side(Axis::X, pos, Side::High);
            assert_eq!(low.xmax + 1, high.xmin);
            assert_eq!(low.width() + high.width(), bb.width());
            assert_eq!(low.union(&high), bb);
        }
    }

    #[test]
    fn clipped_y_axis() {
        let bb = Bounds::new(0, 0, 9, 9);
        let low = bb.clipped_to_side(Axis::Y, 3, Side::Low);
        let high = bb.clipped_to_side(Axis::Y, 3, Side::High);
        assert_eq!(low, Bounds::new(0, 0, 9, 3));
        assert_eq!(high, Bounds::new(0, 4, 9, 9));
    }

    #[test]
    fn side_of_coord() {
        assert_eq!(Side::of_coord(4, 4), Side::Low);
        assert_eq!(Side::of_coord(5, 4), Side::High);
        assert_eq!(Side::Low.opposite(), Side::High);
    }

    #[test]
    fn serde_roundtrip() {
        let bb = Bounds::new(1, 2, 3, 4);
        let json = serde_json::to_string(&bb).unwrap();
        let restored: Bounds = serde_json::from_str(&json).unwrap();
        assert_eq!(bb, restored);
    }
}
