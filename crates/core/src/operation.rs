//! Manufacturing operations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A manufacturing step kind.
///
/// The processing duration of each operation lives in the configuration
/// table, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Drill,
    Mill,
    Furnace,
    Print,
    Pellet,
    Shape,
    Press,
    Inject,
    Mould,
    Shave,
    Cnc,
    Grind,
    CutGlass,
    LaserMark,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::Drill,
        Self::Mill,
        Self::Furnace,
        Self::Print,
        Self::Pellet,
        Self::Shape,
        Self::Press,
        Self::Inject,
        Self::Mould,
        Self::Shave,
        Self::Cnc,
        Self::Grind,
        Self::CutGlass,
        Self::LaserMark,
    ];

    /// Wire and config name of the operation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Drill => "DRILL",
            Self::Mill => "MILL",
            Self::Furnace => "FURNACE",
            Self::Print => "PRINT",
            Self::Pellet => "PELLET",
            Self::Shape => "SHAPE",
            Self::Press => "PRESS",
            Self::Inject => "INJECT",
            Self::Mould => "MOULD",
            Self::Shave => "SHAVE",
            Self::Cnc => "CNC",
            Self::Grind => "GRIND",
            Self::CutGlass => "CUT_GLASS",
            Self::LaserMark => "LASER_MARK",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownOperation(s.to_string()))
    }
}
