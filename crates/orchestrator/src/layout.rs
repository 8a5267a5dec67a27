//! Factory floor layout: addresses, cell positions and robot start points.
//!
//! Cells sit on a grid, filled column by column. Each robot is paired with
//! a cell and starts scattered around it.

use std::collections::{BTreeSet, HashMap};
use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use industry_core::{Address, Operation, Position, Result};

use crate::config::{FactoryConfig, LayoutConfig};

/// Address of the scheduler.
pub const MANAGER: &str = "manager";

/// Address of the order source.
pub const FACTORY: &str = "factory";

const GRID_ORIGIN_X: f64 = -32.0;
const GRID_ORIGIN_Y: f64 = -96.0;

/// Address of the `index`-th work-cell, counting from 1.
#[must_use]
pub fn cell_address(index: usize) -> Address {
    Address::new(format!("gom-{index}"))
}

/// Address of the `index`-th robot, counting from 1.
#[must_use]
pub fn robot_address(index: usize) -> Address {
    Address::new(format!("tr-{index}"))
}

/// Grid position of the `index`-th cell, counting from 1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cell_position(layout: &LayoutConfig, index: usize) -> Position {
    let slot = index.saturating_sub(1);
    let per_column = layout.per_column.max(1);
    let column = (slot / per_column) as f64;
    let row = (slot % per_column) as f64;
    Position::new(
        column.mul_add(layout.column_spacing, GRID_ORIGIN_X),
        row.mul_add(layout.row_spacing, GRID_ORIGIN_Y),
    )
}

/// One standard normal sample (Box-Muller).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Keep u1 away from zero so ln stays finite.
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellSite {
    pub address: Address,
    pub position: Position,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobotSite {
    pub address: Address,
    pub start: Position,
    /// Index into `FactoryLayout::cells` of the paired cell.
    pub paired_cell: usize,
}

/// Every agent's address and where it stands.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryLayout {
    pub scheduler: Address,
    pub source: Address,
    pub warehouse: Position,
    pub cells: Vec<CellSite>,
    pub robots: Vec<RobotSite>,
}

impl FactoryLayout {
    /// Lay out the floor described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when a configured machine set names an unknown
    /// operation.
    pub fn from_config(config: &FactoryConfig) -> Result<Self> {
        let mut rng = config
            .layout
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        let cells = (0..config.cells.count)
            .map(|i| {
                Ok(CellSite {
                    address: cell_address(i + 1),
                    position: cell_position(&config.layout, i + 1),
                    operations: config.cells.machines_for(i)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let robots = (0..config.robots.count)
            .map(|i| {
                let paired_cell = if cells.is_empty() { 0 } else { i % cells.len() };
                let anchor = cells
                    .get(paired_cell)
                    .map_or(config.layout.warehouse, |c| c.position);
                let spray = config.layout.spray;
                let start = Position::new(
                    standard_normal(&mut rng).mul_add(spray, anchor.x),
                    standard_normal(&mut rng).mul_add(spray, anchor.y),
                );
                RobotSite {
                    address: robot_address(i + 1),
                    start,
                    paired_cell,
                }
            })
            .collect();

        Ok(Self {
            scheduler: Address::new(MANAGER),
            source: Address::new(FACTORY),
            warehouse: config.layout.warehouse,
            cells,
            robots,
        })
    }

    #[must_use]
    pub fn cell_addresses(&self) -> Vec<Address> {
        self.cells.iter().map(|c| c.address.clone()).collect()
    }

    #[must_use]
    pub fn robot_addresses(&self) -> Vec<Address> {
        self.robots.iter().map(|r| r.address.clone()).collect()
    }

    /// Fixed destinations a robot can travel to: the cells and the warehouse.
    #[must_use]
    pub fn sites(&self) -> HashMap<Address, Position> {
        self.cells
            .iter()
            .map(|c| (c.address.clone(), c.position))
            .chain(std::iter::once((Address::warehouse(), self.warehouse)))
            .collect()
    }

    /// Robots the `cell`-th cell asks for transport, paired robots first.
    #[must_use]
    pub fn robot_preference(&self, cell: usize) -> Vec<Address> {
        let (paired, others): (Vec<&RobotSite>, Vec<&RobotSite>) =
            self.robots.iter().partition(|r| r.paired_cell == cell);
        paired
            .into_iter()
            .chain(others)
            .map(|r| r.address.clone())
            .collect()
    }

    /// Every robot except `robot`.
    #[must_use]
    pub fn peers_of(&self, robot: &Address) -> Vec<Address> {
        self.robots
            .iter()
            .filter(|r| &r.address != robot)
            .map(|r| r.address.clone())
            .collect()
    }

    /// Operations at least one cell has a machine for.
    #[must_use]
    pub fn serviceable(&self) -> Vec<Operation> {
        self.cells
            .iter()
            .flat_map(|c| c.operations.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
