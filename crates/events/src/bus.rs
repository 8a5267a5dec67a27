//! Event bus for fire-and-forget telemetry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use industry_core::{Address, OrderId};

use crate::error::{Error, Result};
use crate::event::FactoryEvent;

/// Circuit breaker to stop feeding subscribers that went away.
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    threshold: u32,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given failure threshold.
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            threshold,
        }
    }

    /// Check if a send should be attempted.
    pub fn allow_request(&self) -> bool {
        self.failure_count.load(Ordering::Relaxed) < self.threshold
    }

    /// Record a successful send.
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Record a failed send.
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

struct Subscriber {
    sender: broadcast::Sender<FactoryEvent>,
    pattern: EventPattern,
    breaker: Arc<CircuitBreaker>,
}

/// Subscription handle for receiving events.
pub struct EventSubscription {
    receiver: broadcast::Receiver<FactoryEvent>,
}

impl EventSubscription {
    /// Receive the next event.
    ///
    /// # Errors
    ///
    /// `Lagged` if the subscriber fell behind, `ChannelClosed` once the bus is gone.
    pub async fn recv(&mut self) -> Result<FactoryEvent> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => Error::Lagged { skipped },
            broadcast::error::RecvError::Closed => Error::ChannelClosed,
        })
    }

    /// Try to receive an event without waiting.
    ///
    /// # Errors
    ///
    /// `ChannelClosed` when nothing is buffered or the bus is gone.
    pub fn try_recv(&mut self) -> Result<FactoryEvent> {
        self.receiver.try_recv().map_err(|_| Error::ChannelClosed)
    }
}

/// Pattern for filtering events.
#[derive(Debug, Clone)]
pub enum EventPattern {
    /// Match all events.
    All,
    /// Match events by type.
    ByType(String),
    /// Match events by multiple types.
    ByTypes(Vec<String>),
    /// Match events about one order.
    ByOrder(OrderId),
    /// Match events about one agent.
    ByAgent(Address),
}

impl EventPattern {
    /// Check if an event matches this pattern.
    #[must_use]
    pub fn matches(&self, event: &FactoryEvent) -> bool {
        match self {
            Self::All => true,
            Self::ByType(t) => event.event_type() == t,
            Self::ByTypes(types) => types.iter().any(|t| event.event_type() == t),
            Self::ByOrder(id) => event.order_id() == Some(*id),
            Self::ByAgent(addr) => event.agent() == Some(addr),
        }
    }
}

/// Event bus for publishing and subscribing to telemetry.
pub struct EventBus {
    broadcast: broadcast::Sender<FactoryEvent>,
    subscribers: RwLock<HashMap<String, Subscriber>>,
    next_id: RwLock<u64>,
    channel_capacity: usize,
    failure_threshold: u32,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        EventBusBuilder::new().build()
    }

    /// Publish an event to global and matching pattern subscribers.
    ///
    /// Fire-and-forget: having no subscribers is not an error.
    pub async fn publish(&self, event: FactoryEvent) {
        debug!(event_type = event.event_type(), "Publishing event");

        let _ = self.broadcast.send(event.clone());

        let subscribers = self.subscribers.read().await;
        for sub in subscribers
            .values()
            .filter(|sub| sub.pattern.matches(&event))
        {
            if !sub.breaker.allow_request() {
                debug!(
                    event_type = event.event_type(),
                    subscriber_failures = sub.breaker.failure_count(),
                    "Skipping subscriber due to circuit breaker"
                );
                continue;
            }

            match sub.sender.send(event.clone()) {
                Ok(_) => sub.breaker.record_success(),
                Err(broadcast::error::SendError(_)) => {
                    sub.breaker.record_failure();
                    debug!(
                        event_type = event.event_type(),
                        subscriber_failures = sub.breaker.failure_count(),
                        "Failed to deliver event to subscriber"
                    );
                }
            }
        }
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.broadcast.subscribe(),
        }
    }

    /// Subscribe to events matching a pattern.
    pub async fn subscribe_with_pattern(
        &self,
        pattern: EventPattern,
    ) -> (String, EventSubscription) {
        let (sender, receiver) = broadcast::channel(self.channel_capacity);

        let mut next_id = self.next_id.write().await;
        let id = format!("sub_{}", *next_id);
        *next_id = next_id.saturating_add(1);

        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(
            id.clone(),
            Subscriber {
                sender,
                pattern,
                breaker: Arc::new(CircuitBreaker::new(self.failure_threshold)),
            },
        );

        (id, EventSubscription { receiver })
    }

    /// Unsubscribe a pattern-based subscriber.
    pub async fn unsubscribe(&self, subscriber_id: &str) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.remove(subscriber_id);
    }

    /// Number of pattern-based subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Get the circuit breaker failure threshold.
    #[must_use]
    pub const fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `EventBus`.
pub struct EventBusBuilder {
    channel_capacity: usize,
    failure_threshold: u32,
}

impl EventBusBuilder {
    /// Create a new builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channel_capacity: 1024,
            failure_threshold: 5,
        }
    }

    /// Set the broadcast channel capacity (zero is raised to one).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the circuit breaker failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Build the event bus.
    #[must_use]
    pub fn build(self) -> EventBus {
        let (broadcast, _) = broadcast::channel(self.channel_capacity);
        EventBus {
            broadcast,
            subscribers: RwLock::new(HashMap::new()),
            next_id: RwLock::new(0),
            channel_capacity: self.channel_capacity,
            failure_threshold: self.failure_threshold,
        }
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
