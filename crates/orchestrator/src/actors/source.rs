//! OrderSourceActor - feeds orders to the scheduler.
//!
//! Generates random orders on a fixed period (or accepts explicit
//! `Submit`s) and keeps count of how the scheduler answered.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{debug, info, warn};

use industry_core::{Address, Operation, Order, OrderId, ResultExt};

use super::messages::{SourceMessage, SourceStats};
use super::timer::{Ticker, TickerHandle};
use crate::config::OrderConfig;
use crate::messaging::{Envelope, MessageBus, Performative, Router, Template};

/// Random order generator with incrementing ids starting at 1.
#[derive(Debug, Clone)]
pub struct OrderFactory {
    next_id: OrderId,
    pool: Vec<Operation>,
    operations_per_order: usize,
    max_tr_count: u32,
    priority: i32,
    limit: Option<u64>,
}

impl OrderFactory {
    /// Draw operations from `pool`, or from every operation when it is empty.
    #[must_use]
    pub fn new(config: &OrderConfig, pool: Vec<Operation>) -> Self {
        let pool = if pool.is_empty() {
            Operation::ALL.to_vec()
        } else {
            pool
        };
        Self {
            next_id: 1,
            pool,
            operations_per_order: config.operations_per_order,
            max_tr_count: u32::try_from(config.max_tr_count.max(1)).unwrap_or(u32::MAX),
            priority: config.priority,
            limit: config.limit,
        }
    }

    /// Orders produced so far.
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.next_id - 1
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.emitted() >= limit)
    }

    /// The next order, or `None` once the limit is reached.
    pub fn next_order<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Order> {
        if self.exhausted() {
            return None;
        }
        let operations: Vec<Operation> = (0..self.operations_per_order)
            .filter_map(|_| self.pool.choose(&mut *rng).copied())
            .collect();
        let tr_counts = operations
            .iter()
            .map(|_| rng.gen_range(1..=self.max_tr_count))
            .collect();
        let order = Order::new(self.priority, self.next_id, operations, tr_counts);
        self.next_id = self.next_id.saturating_add(1);
        Some(order)
    }
}

/// The order source actor definition.
#[derive(Clone, Default)]
pub struct OrderSourceActorDef;

/// Arguments passed to the actor on startup.
pub struct SourceArguments {
    pub address: Address,
    pub scheduler: Address,
    pub orders: OrderConfig,
    /// Operations generated orders may use; empty means all.
    pub pool: Vec<Operation>,
    /// Emit generated orders automatically. Off means `Submit` only.
    pub auto_emit: bool,
    pub seed: Option<u64>,
    pub bus: Arc<MessageBus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceRoute {
    Accepted,
    Rejected,
    Completed,
}

/// Actor state.
pub struct SourceState {
    address: Address,
    scheduler: Address,
    factory: OrderFactory,
    stats: SourceStats,
    rng: StdRng,
    router: Router<SourceRoute>,
    bus: Arc<MessageBus>,
    ticker: Option<TickerHandle>,
}

impl Actor for OrderSourceActorDef {
    type Msg = SourceMessage;
    type State = SourceState;
    type Arguments = SourceArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            address = %args.address,
            period_ms = args.orders.period_ms,
            auto_emit = args.auto_emit,
            "OrderSourceActor starting"
        );

        let from_scheduler = Template::sender(args.scheduler.clone());
        let router = Router::new()
            .route(
                from_scheduler
                    .clone()
                    .and(Template::performative(Performative::Agree)),
                SourceRoute::Accepted,
            )
            .route(
                from_scheduler
                    .clone()
                    .and(Template::performative(Performative::Refuse)),
                SourceRoute::Rejected,
            )
            .route(
                from_scheduler.and(Template::performative(Performative::Inform)),
                SourceRoute::Completed,
            );

        let period = Duration::from_millis(args.orders.period_ms.max(1));
        let ticker = args
            .auto_emit
            .then(|| Ticker::new(period).start(myself, || SourceMessage::EmitTick));

        Ok(SourceState {
            address: args.address,
            scheduler: args.scheduler,
            factory: OrderFactory::new(&args.orders, args.pool),
            stats: SourceStats::default(),
            rng: args
                .seed
                .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
            router,
            bus: args.bus,
            ticker,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SourceMessage::Deliver(envelope) => Self::handle_envelope(state, &envelope),

            SourceMessage::EmitTick => match state.factory.next_order(&mut state.rng) {
                Some(order) => Self::submit(state, order).await,
                None => {
                    if let Some(ticker) = state.ticker.take() {
                        info!(emitted = state.factory.emitted(), "Order limit reached");
                        ticker.stop();
                    }
                }
            },

            SourceMessage::Submit(order) => Self::submit(state, order).await,

            SourceMessage::GetStats { reply } => {
                let _ = reply.send(state.stats.clone());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        info!(address = %state.address, "OrderSourceActor stopping");
        if let Some(ticker) = state.ticker.take() {
            ticker.stop();
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Implementation
// ═══════════════════════════════════════════════════════════════════════════

impl OrderSourceActorDef {
    async fn submit(state: &mut SourceState, order: Order) {
        let order_id = order.order_id;
        let envelope = Envelope::new(
            state.address.clone(),
            state.scheduler.clone(),
            Performative::Request,
        )
        .with_correlation(order_id.to_string())
        .with_payload(&order);

        match envelope {
            Ok(envelope) => {
                debug!(order_id, operations = ?order.operations, tr_counts = ?order.tr_counts, "Submitting order");
                state.stats.submitted = state.stats.submitted.saturating_add(1);
                state.bus.send_or_log(envelope).await;
            }
            Err(e) => warn!(order_id, error = %e, "Failed to encode order"),
        }
    }

    fn handle_envelope(state: &mut SourceState, envelope: &Envelope) {
        let Some(route) = state.router.classify(envelope) else {
            warn!(envelope = %envelope, "Source dropping unexpected message");
            return;
        };
        let Some(order_id) = envelope.correlated_order() else {
            warn!(envelope = %envelope, "Scheduler answer without order correlation");
            return;
        };

        match route {
            SourceRoute::Accepted => state.stats.accepted.push(order_id),
            SourceRoute::Rejected => {
                warn!(order_id, "Order rejected by scheduler");
                state.stats.rejected.push(order_id);
            }
            SourceRoute::Completed => {
                let stages = Order::from_json(&envelope.body)
                    .into_option_logged()
                    .map(|order| order.current_operation);
                info!(order_id, stages = ?stages, "Order finished");
                state.stats.completed.push(order_id);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(limit: Option<u64>) -> OrderConfig {
        OrderConfig {
            operations_per_order: 4,
            max_tr_count: 3,
            limit,
            ..OrderConfig::default()
        }
    }

    #[test]
    fn should_number_orders_from_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut factory = OrderFactory::new(&config(None), Vec::new());
        let ids: Vec<OrderId> = (0..3)
            .filter_map(|_| factory.next_order(&mut rng))
            .map(|o| o.order_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(factory.emitted(), 3);
    }

    #[test]
    fn should_draw_from_pool_and_bound_robot_counts() {
        let mut rng = StdRng::seed_from_u64(2);
        let pool = vec![Operation::Drill, Operation::Mill];
        let mut factory = OrderFactory::new(&config(None), pool.clone());
        for _ in 0..20 {
            let order = factory.next_order(&mut rng).unwrap();
            assert_eq!(order.operations.len(), 4);
            assert_eq!(order.tr_counts.len(), 4);
            assert!(order.operations.iter().all(|op| pool.contains(op)));
            assert!(order.tr_counts.iter().all(|c| (1..=3).contains(c)));
            assert_eq!(order.current_operation, 0);
        }
    }

    #[test]
    fn should_stop_at_limit() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut factory = OrderFactory::new(&config(Some(2)), Vec::new());
        assert!(factory.next_order(&mut rng).is_some());
        assert!(factory.next_order(&mut rng).is_some());
        assert!(factory.exhausted());
        assert!(factory.next_order(&mut rng).is_none());
    }
}
