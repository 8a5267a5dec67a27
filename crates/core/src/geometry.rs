//! Planar positions on the factory floor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 2D coordinate. Work-cells are fixed, transport robots move.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Displacement vector from `self` to `other`.
    #[must_use]
    pub fn delta_to(&self, other: &Self) -> (f64, f64) {
        (other.x - self.x, other.y - self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_measure_euclidean_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_compute_delta() {
        let a = Position::new(1.0, 1.0);
        let b = Position::new(-1.0, 4.0);
        assert_eq!(a.delta_to(&b), (-2.0, 3.0));
    }
}
