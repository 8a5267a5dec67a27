//! Timer tasks that post messages back into an actor's mailbox.

use std::time::Duration;

use ractor::{ActorRef, Message};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Stops the ticker it came from; dropping it stops the ticker too.
#[derive(Debug)]
pub struct TickerHandle {
    stop_tx: watch::Sender<bool>,
}

impl TickerHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Periodic ticker. The first tick fires one `interval` after start.
#[derive(Clone, Debug)]
pub struct Ticker {
    interval: Duration,
}

impl Ticker {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Send `make()` to `target` every interval until stopped or the actor
    /// is gone.
    pub fn start<M, F>(&self, target: ActorRef<M>, make: F) -> TickerHandle
    where
        M: Message,
        F: Fn() -> M + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if target.send_message(make()).is_err() {
                            break;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        TickerHandle { stop_tx }
    }
}

/// Deliver `message` to `target` once, after `delay`.
pub fn send_after<M: Message>(target: ActorRef<M>, delay: Duration, message: M) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = target.send_message(message);
    });
}

/// Exponential backoff capped at `max_ms`.
#[must_use]
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(backoff.min(max_ms))
}
