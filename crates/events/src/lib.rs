//! Factory telemetry.
//!
//! Agents publish fire-and-forget [`FactoryEvent`]s (robot positions, roster
//! snapshots, order lifecycle, recruitment outcomes) to an [`EventBus`].
//! Consumers subscribe to everything or to a pattern; nobody acknowledges.
//!
//! # Example
//!
//! ```ignore
//! use industry_events::{EventBus, EventPattern, FactoryEvent};
//!
//! let bus = EventBus::new();
//! let (_id, mut sub) = bus.subscribe_with_pattern(EventPattern::ByType("order_completed".into())).await;
//! bus.publish(FactoryEvent::order_completed(42)).await;
//! let event = sub.recv().await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bus;
pub mod error;
pub mod event;
pub mod sink;

pub use bus::{CircuitBreaker, EventBus, EventBusBuilder, EventPattern, EventSubscription};
pub use error::{Error, Result};
pub use event::FactoryEvent;
pub use sink::spawn_log_sink;
