//! Addressed message passing between factory agents.
//!
//! # Key Types
//!
//! - `Envelope`: one message with a performative and optional correlation
//! - `Template`: composable predicate used to classify inbound envelopes
//! - `Router`: ordered template table mapping envelopes to a route kind
//! - `MessageBus`: address registry delivering envelopes to mailboxes

mod bus;
mod envelope;
mod template;

pub use bus::{Mailbox, MessageBus};
pub use envelope::{Envelope, Performative};
pub use template::{Router, Template};
