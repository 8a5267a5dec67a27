//! Straight-line movement toward a destination at a fixed speed.
//!
//! The actor side owns the ticker; this module only does the arithmetic.

use std::time::Duration;

use industry_core::Position;

/// Relative slack when deciding the final step, so floating point drift
/// never costs an extra tick.
const ARRIVAL_SLACK: f64 = 1e-9;

/// Result of one movement tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveStep {
    /// Still travelling; the new position.
    Advanced(Position),
    /// Snapped onto the destination.
    Arrived(Position),
}

impl MoveStep {
    #[must_use]
    pub const fn position(&self) -> Position {
        match self {
            Self::Advanced(p) | Self::Arrived(p) => *p,
        }
    }

    #[must_use]
    pub const fn is_arrived(&self) -> bool {
        matches!(self, Self::Arrived(_))
    }
}

/// A move toward `destination`, covering `stride` units per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Movement {
    destination: Position,
    stride: f64,
}

impl Movement {
    /// `speed` is in units per second, `tick` the integration period.
    #[must_use]
    pub fn new(destination: Position, speed: f64, tick: Duration) -> Self {
        Self {
            destination,
            stride: speed * tick.as_secs_f64(),
        }
    }

    #[must_use]
    pub const fn destination(&self) -> Position {
        self.destination
    }

    /// Distance covered by a full tick.
    #[must_use]
    pub const fn stride(&self) -> f64 {
        self.stride
    }

    /// Advance `current` by one tick.
    #[must_use]
    pub fn step(&self, current: Position) -> MoveStep {
        let distance = current.distance_to(&self.destination);
        if distance <= self.stride * (1.0 + ARRIVAL_SLACK) || distance == 0.0 {
            return MoveStep::Arrived(self.destination);
        }
        let (dx, dy) = current.delta_to(&self.destination);
        let scale = self.stride / distance;
        MoveStep::Advanced(Position::new(
            current.x + dx * scale,
            current.y + dy * scale,
        ))
    }

    /// Upper bound on the ticks needed to reach the destination from `from`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn ticks_from(&self, from: Position) -> u64 {
        if self.stride <= 0.0 {
            return u64::MAX;
        }
        let ticks = (from.distance_to(&self.destination) / self.stride).ceil();
        (ticks as u64).max(1)
    }
}
