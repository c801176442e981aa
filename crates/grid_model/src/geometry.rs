//! Grid geometry: points, sizes, and rectangular footprints.
//!
//! Coordinates are integer grid units on an unbounded plane. A cell occupies
//! the rectangle spanned by its position (top-left corner) and its size;
//! the occupancy invariant says no two cells may claim overlapping
//! rectangles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position on the grid, in grid units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
}

impl GridPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A cell footprint size, in grid units. Zero-area sizes are normalized to
/// at least 1x1 so every cell occupies at least one grid square.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub w: u32,
    pub h: u32,
}

impl GridSize {
    pub fn new(w: u32, h: u32) -> Self {
        Self {
            w: w.max(1),
            h: h.max(1),
        }
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self { w: 1, h: 1 }
    }
}

/// A rectangle on the grid, derived from a position and a size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridRect {
    pub origin: GridPoint,
    pub size: GridSize,
}

impl GridRect {
    pub fn new(origin: GridPoint, size: GridSize) -> Self {
        Self { origin, size }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.origin.x + self.size.w as i64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.origin.y + self.size.h as i64
    }

    /// Whether two rectangles share at least one grid square.
    ///
    /// Edges are exclusive: rectangles that merely touch do not intersect.
    pub fn intersects(&self, other: &GridRect) -> bool {
        self.origin.x < other.right()
            && other.origin.x < self.right()
            && self.origin.y < other.bottom()
            && other.origin.y < self.bottom()
    }

    /// Whether the rectangle contains the given point.
    pub fn contains(&self, point: GridPoint) -> bool {
        point.x >= self.origin.x
            && point.x < self.right()
            && point.y >= self.origin.y
            && point.y < self.bottom()
    }
}
