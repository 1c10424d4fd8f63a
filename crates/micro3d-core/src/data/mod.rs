//! Data models for stage positions
//!
//! This module provides:
//! - Absolute XYZ machine positions in millimeters
//! - Axis selection for single-axis steps
//! - Wire formatting of positions as absolute linear moves

use crate::constants::{COORDINATE_DECIMALS, GCODE_LINEAR_MOVE, ZERO_EPSILON};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis (focus)
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

/// Absolute stage position in machine coordinates (millimeters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a new position with X, Y, Z coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "Position axes must be finite: x={x}, y={y}, z={z}"
        );
        Self { x, y, z }
    }

    /// Get one axis
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Copy of this position with one axis replaced
    pub fn with(&self, axis: Axis, value: f64) -> Self {
        let mut next = *self;
        match axis {
            Axis::X => next.x = value,
            Axis::Y => next.y = value,
            Axis::Z => next.z = value,
        }
        next
    }

    /// Copy of this position moved `delta` millimeters along one axis
    pub fn offset(&self, axis: Axis, delta: f64) -> Self {
        self.with(axis, self.get(axis) + delta)
    }

    /// Copy of this position moved by `(dx, dy)` in the XY plane
    pub fn offset_xy(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z,
        }
    }

    /// Copy of this position with Z replaced
    pub fn with_z(&self, z: f64) -> Self {
        self.with(Axis::Z, z)
    }

    /// Absolute linear move to this position, e.g. `G1 X10.00 Y20.00 Z5.00`
    ///
    /// Coordinates within [`ZERO_EPSILON`] of zero are sent as `0.00` so the
    /// controller never sees `-0.00`.
    pub fn to_gcode(&self) -> String {
        format!(
            "{} X{:.prec$} Y{:.prec$} Z{:.prec$}",
            GCODE_LINEAR_MOVE,
            snap_to_zero(self.x),
            snap_to_zero(self.y),
            snap_to_zero(self.z),
            prec = COORDINATE_DECIMALS
        )
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.2} Y:{:.2} Z:{:.2}", self.x, self.y, self.z)
    }
}

/// Replace near-zero magnitudes with exactly zero
pub fn snap_to_zero(value: f64) -> f64 {
    if value.abs() < ZERO_EPSILON {
        0.0
    } else {
        value
    }
}
