//! Address registry delivering envelopes to agent mailboxes.

use std::collections::HashMap;
use std::sync::Arc;

use ractor::{ActorRef, Message};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use industry_core::Address;

use super::envelope::Envelope;
use crate::actors::ActorError;

/// Anything that can take delivery of an envelope.
pub trait Mailbox: Send + Sync {
    /// Hand `envelope` over without waiting for it to be processed.
    ///
    /// # Errors
    ///
    /// `DeliveryFailed` when the receiving side is gone.
    fn deliver(&self, envelope: Envelope) -> Result<(), ActorError>;
}

impl<M> Mailbox for ActorRef<M>
where
    M: Message + From<Envelope>,
{
    fn deliver(&self, envelope: Envelope) -> Result<(), ActorError> {
        let to = envelope.to.to_string();
        self.send_message(M::from(envelope))
            .map_err(|_| ActorError::delivery_failed(to, "actor mailbox closed"))
    }
}

impl Mailbox for mpsc::UnboundedSender<Envelope> {
    fn deliver(&self, envelope: Envelope) -> Result<(), ActorError> {
        let to = envelope.to.to_string();
        self.send(envelope)
            .map_err(|_| ActorError::delivery_failed(to, "channel closed"))
    }
}

/// Routes envelopes by their `to` address.
///
/// An optional tap receives a copy of every envelope routed to a
/// registered address, in causal order.
pub struct MessageBus {
    mailboxes: RwLock<HashMap<Address, Arc<dyn Mailbox>>>,
    tap: Option<mpsc::UnboundedSender<Envelope>>,
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            tap: None,
        }
    }

    /// Create a bus that copies every routed envelope to `tap`.
    #[must_use]
    pub fn with_tap(tap: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            tap: Some(tap),
        }
    }

    /// Register (or replace) the mailbox for `address`.
    pub async fn register(&self, address: Address, mailbox: Arc<dyn Mailbox>) {
        debug!(address = %address, "Registering mailbox");
        self.mailboxes.write().await.insert(address, mailbox);
    }

    /// Remove the mailbox for `address`.
    pub async fn unregister(&self, address: &Address) {
        self.mailboxes.write().await.remove(address);
    }

    pub async fn is_registered(&self, address: &Address) -> bool {
        self.mailboxes.read().await.contains_key(address)
    }

    /// Registered addresses, sorted.
    pub async fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.mailboxes.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Deliver `envelope` to the mailbox registered for its `to` address.
    ///
    /// # Errors
    ///
    /// `UnknownAddress` when nothing is registered there, `DeliveryFailed`
    /// when the mailbox is closed.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ActorError> {
        let mailbox = self
            .mailboxes
            .read()
            .await
            .get(&envelope.to)
            .cloned()
            .ok_or_else(|| ActorError::unknown_address(envelope.to.to_string()))?;

        debug!(
            message_id = %envelope.id,
            performative = %envelope.performative,
            sender = %envelope.sender,
            to = %envelope.to,
            correlation = ?envelope.correlation,
            "Delivering envelope"
        );

        // Tapped before delivery: a reply is never recorded ahead of its cause.
        if let Some(tap) = &self.tap {
            if tap.send(envelope.clone()).is_err() {
                warn!("Message tap closed");
            }
        }
        mailbox.deliver(envelope)
    }

    /// Deliver and log instead of propagating a failure.
    pub async fn send_or_log(&self, envelope: Envelope) {
        let summary = envelope.to_string();
        if let Err(e) = self.send(envelope).await {
            warn!(envelope = %summary, error = %e, "Failed to deliver envelope");
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::messaging::Performative;

    fn envelope(to: &str) -> Envelope {
        Envelope::new(Address::new("manager"), Address::new(to), Performative::Inform)
    }

    #[tokio::test]
    async fn should_deliver_to_registered_mailbox() {
        let bus = MessageBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.register(Address::new("factory"), Arc::new(tx)).await;

        bus.send(envelope("factory")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.to, Address::new("factory"));
    }

    #[tokio::test]
    async fn should_reject_unknown_address() {
        let bus = MessageBus::new();
        let result = bus.send(envelope("nobody")).await;
        assert!(matches!(result, Err(ActorError::UnknownAddress(_))));
    }

    #[tokio::test]
    async fn should_report_closed_mailbox() {
        let bus = MessageBus::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        bus.register(Address::new("gom-1"), Arc::new(tx)).await;

        let result = bus.send(envelope("gom-1")).await;
        assert!(matches!(result, Err(ActorError::DeliveryFailed { .. })));
    }

    #[tokio::test]
    async fn should_copy_routed_envelopes_to_tap() {
        let (tap_tx, mut tap_rx) = mpsc::unbounded_channel();
        let bus = MessageBus::with_tap(tap_tx);
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.register(Address::new("tr-1"), Arc::new(tx)).await;

        bus.send(envelope("tr-1")).await.unwrap();
        let _ = bus.send(envelope("missing")).await;

        assert_eq!(tap_rx.recv().await.unwrap().to, Address::new("tr-1"));
        assert!(tap_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn should_list_and_unregister_addresses() {
        let bus = MessageBus::new();
        let (tx, _rx) = mpsc::unbounded_channel::<Envelope>();
        bus.register(Address::new("tr-2"), Arc::new(tx.clone())).await;
        bus.register(Address::new("tr-1"), Arc::new(tx)).await;
        assert_eq!(
            bus.addresses().await,
            vec![Address::new("tr-1"), Address::new("tr-2")]
        );

        bus.unregister(&Address::new("tr-1")).await;
        assert!(!bus.is_registered(&Address::new("tr-1")).await);
    }
}
