//! # Industry Core
//!
//! Domain types shared by every agent on the factory floor: operations,
//! orders and their per-stage requests, positions, and the core error type.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod geometry;
pub mod operation;
pub mod order;
pub mod result;

pub use error::Error;
pub use geometry::Position;
pub use operation::Operation;
pub use order::{ActiveOrder, Address, Order, OrderId, StageRequest, WAREHOUSE};
pub use result::{Result, ResultExt};
