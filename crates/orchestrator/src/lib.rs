//! # Orchestrator
//!
//! The agents of the factory floor: a central scheduler, work-cells that
//! perform operations, and transport robots that carry goods between them,
//! optionally in negotiated teams.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub use industry_core::{Error, Result};

/// Actors: scheduler, work-cell, transport robot, order source.
pub mod actors;

/// Wiring a whole factory from configuration.
pub mod bootstrap;

/// Layered TOML configuration.
pub mod config;

/// Floor layout: addresses and positions.
pub mod layout;

/// Typed envelopes, predicate templates and the address registry.
pub mod messaging;

/// Pure straight-line movement.
pub mod movement;

/// Priority ordering of queued orders.
pub mod queue;

pub use actors::ActorError;
pub use bootstrap::Factory;
pub use config::FactoryConfig;
