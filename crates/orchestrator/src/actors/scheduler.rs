//! SchedulerActor - matches queued orders to idle work-cells.
//!
//! The bookkeeping lives in `SchedulerBook`, a plain value the actor owns;
//! the actor adds envelopes, timers and telemetry around it. Dispatch runs
//! after every state change and on the poll tick, and is serialized with
//! completion handling by the actor mailbox.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use im::HashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use industry_core::{ActiveOrder, Address, Operation, Order, OrderId, StageRequest};
use industry_events::{EventBus, FactoryEvent};

use super::errors::ActorError;
use super::messages::{OrderView, SchedulerMessage, SchedulerStats};
use super::timer::{Ticker, TickerHandle};
use crate::config::{DispatchConfig, TimingConfig};
use crate::messaging::{Envelope, MessageBus, Performative, Router, Template};
use crate::queue::OrderQueue;

/// Roster entry for one work-cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoMInfo {
    pub address: Address,
    pub capabilities: BTreeSet<Operation>,
}

impl GoMInfo {
    #[must_use]
    pub fn new(address: Address, capabilities: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            address,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn can_perform(&self, operation: Operation) -> bool {
        self.capabilities.contains(&operation)
    }
}

/// Outcome of an enqueue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    Rejected(String),
    /// The order had no stages left and is complete on arrival.
    AlreadyDone(Order),
}

/// A stage ready to be sent to a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub cell: Address,
    pub request: StageRequest,
}

/// Result of a completed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub order_id: OrderId,
    /// Index of the stage that just finished.
    pub stage: usize,
    /// The finished order when this was its last stage.
    pub completed: Option<Order>,
}

/// Queue, idle pool and in-flight orders.
pub struct SchedulerBook {
    dispatch: DispatchConfig,
    queue: OrderQueue,
    idle: BTreeSet<Address>,
    /// Cells that refused since the last poll tick; they rejoin `idle` on the tick.
    cooling: BTreeSet<Address>,
    roster: HashMap<Address, GoMInfo>,
    active: HashMap<OrderId, ActiveOrder>,
    completed: u64,
    halted: Option<String>,
}

impl SchedulerBook {
    /// Every rostered cell starts idle.
    #[must_use]
    pub fn new(dispatch: DispatchConfig, cells: Vec<GoMInfo>) -> Self {
        let idle = cells.iter().map(|c| c.address.clone()).collect();
        let roster = cells.into_iter().map(|c| (c.address.clone(), c)).collect();
        Self {
            queue: OrderQueue::new(dispatch.priority_order),
            dispatch,
            idle,
            cooling: BTreeSet::new(),
            roster,
            active: HashMap::new(),
            completed: 0,
            halted: None,
        }
    }

    fn rostered_can_perform(&self, operation: Operation) -> bool {
        self.roster.values().any(|g| g.can_perform(operation))
    }

    /// Queue a new order.
    pub fn enqueue(&mut self, order: Order) -> Enqueued {
        let order_id = order.order_id;
        if self.active.contains_key(&order_id) || self.queue.contains(order_id) {
            return Enqueued::Rejected(format!("order {order_id} is already known"));
        }
        if order.is_done() {
            self.completed = self.completed.saturating_add(1);
            return Enqueued::AlreadyDone(order);
        }
        if self.dispatch.capability_filter {
            let missing = order
                .operations
                .iter()
                .find(|op| !self.rostered_can_perform(**op));
            if let Some(op) = missing {
                return Enqueued::Rejected(format!("no work-cell can perform {op}"));
            }
        }
        self.queue.push(order);
        Enqueued::Accepted
    }

    /// Take the most urgent dispatchable order and an idle cell for it.
    ///
    /// With the capability filter, orders whose next operation no idle cell
    /// can perform are skipped and stay queued.
    pub fn next_dispatch<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Dispatch> {
        if self.halted.is_some() || self.idle.is_empty() || self.queue.is_empty() {
            return None;
        }

        let filter = self.dispatch.capability_filter;
        let idle = &self.idle;
        let roster = &self.roster;
        let capable = |operation: Operation, cell: &Address| {
            !filter || roster.get(cell).is_some_and(|g| g.can_perform(operation))
        };

        let order = self.queue.pop_first_matching(|order| {
            order
                .current()
                .is_some_and(|op| idle.iter().any(|cell| capable(op, cell)))
        })?;
        let operation = order.current()?;
        let candidates: Vec<&Address> = idle.iter().filter(|c| capable(operation, c)).collect();
        let cell = (*candidates.choose(rng)?).clone();

        self.idle.remove(&cell);
        let mut active = self
            .active
            .get(&order.order_id)
            .cloned()
            .unwrap_or_else(|| ActiveOrder::new(order.clone()));
        active.order = order;
        active.cell = Some(cell.clone());
        let request = active.stage_request()?;
        self.active.insert(request.order_id, active);

        Some(Dispatch { cell, request })
    }

    /// Put back an order whose dispatch could not be delivered.
    ///
    /// The cell stays out of the idle pool.
    pub fn undeliverable(&mut self, dispatch: &Dispatch) {
        if let Some(active) = self.active.get_mut(&dispatch.request.order_id) {
            active.cell = None;
            self.queue.push(active.order.clone());
        }
    }

    /// A cell refused a stage: re-enqueue the order unchanged.
    ///
    /// When refusing cells are restored, the cell cools down until the next
    /// poll tick so the same stage is not bounced straight back to it.
    ///
    /// # Errors
    ///
    /// `Internal` when the order is not in flight at `cell`.
    pub fn on_refuse(&mut self, order_id: OrderId, cell: &Address) -> Result<(), ActorError> {
        let active = self
            .active
            .get_mut(&order_id)
            .filter(|a| a.cell.as_ref() == Some(cell))
            .ok_or_else(|| {
                ActorError::internal(format!("order {order_id} is not in flight at {cell}"))
            })?;
        active.cell = None;
        self.queue.push(active.order.clone());
        if self.dispatch.restore_refused_cells {
            self.cooling.insert(cell.clone());
        }
        Ok(())
    }

    /// Return every cooling cell to the idle pool.
    pub fn end_cooldown(&mut self) {
        self.idle.extend(std::mem::take(&mut self.cooling));
    }

    /// A cell finished a stage: free the cell and advance the order.
    ///
    /// # Errors
    ///
    /// `Internal` when the order is not in flight at `cell`; the cell is
    /// returned to the idle pool regardless.
    pub fn on_inform(&mut self, order_id: OrderId, cell: &Address) -> Result<StageReport, ActorError> {
        if self.roster.contains_key(cell) {
            self.cooling.remove(cell);
            self.idle.insert(cell.clone());
        }
        let active = self
            .active
            .get_mut(&order_id)
            .filter(|a| a.cell.as_ref() == Some(cell))
            .ok_or_else(|| {
                ActorError::internal(format!("order {order_id} is not in flight at {cell}"))
            })?;
        let stage = active.order.current_operation;
        let done = active.advance(cell.clone())?;
        if !done {
            self.queue.push(active.order.clone());
            return Ok(StageReport {
                order_id,
                stage,
                completed: None,
            });
        }
        let finished = self.active.remove(&order_id).map(|a| a.order);
        self.completed = self.completed.saturating_add(1);
        Ok(StageReport {
            order_id,
            stage,
            completed: finished,
        })
    }

    pub fn halt(&mut self, reason: impl Into<String>) {
        self.halted = Some(reason.into());
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued: self.queue.len(),
            in_flight: self.active.values().filter(|a| a.cell.is_some()).count(),
            idle_cells: self.idle.iter().cloned().collect(),
            cooling_cells: self.cooling.iter().cloned().collect(),
            completed: self.completed,
            halted: self.halted.clone(),
        }
    }

    /// Queued ids in service order.
    #[must_use]
    pub fn queued_ids(&self) -> Vec<OrderId> {
        self.queue.ordered_ids()
    }

    #[must_use]
    pub fn order_view(&self, order_id: OrderId) -> Option<OrderView> {
        let queued = self.queue.contains(order_id);
        match self.active.get(&order_id) {
            Some(active) => Some(OrderView {
                order: active.order.clone(),
                location: active.location.clone(),
                cell: active.cell.clone(),
                queued,
            }),
            None => self.queue.get(order_id).map(|order| OrderView {
                order: order.clone(),
                location: Address::warehouse(),
                cell: None,
                queued,
            }),
        }
    }
}

/// The scheduler actor definition.
#[derive(Clone, Default)]
pub struct SchedulerActorDef;

/// Arguments passed to the actor on startup.
pub struct SchedulerArguments {
    pub address: Address,
    /// Where completions are reported.
    pub source: Address,
    pub cells: Vec<GoMInfo>,
    pub dispatch: DispatchConfig,
    pub poll_interval: Duration,
    pub snapshot_interval: Duration,
    pub receive_timeout: Duration,
    pub seed: Option<u64>,
    pub bus: Arc<MessageBus>,
    pub telemetry: Arc<EventBus>,
}

impl SchedulerArguments {
    /// Arguments with default dispatch policy and timing.
    pub fn new(
        address: Address,
        source: Address,
        cells: Vec<GoMInfo>,
        bus: Arc<MessageBus>,
        telemetry: Arc<EventBus>,
    ) -> Self {
        let timing = TimingConfig::default();
        Self {
            address,
            source,
            cells,
            dispatch: DispatchConfig::default(),
            poll_interval: timing.scheduler_poll(),
            snapshot_interval: timing.roster_snapshot(),
            receive_timeout: timing.receive_timeout(),
            seed: None,
            bus,
            telemetry,
        }
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    #[must_use]
    pub fn with_timing(mut self, timing: &TimingConfig) -> Self {
        self.poll_interval = timing.scheduler_poll();
        self.snapshot_interval = timing.roster_snapshot();
        self.receive_timeout = timing.receive_timeout();
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerRoute {
    Failure,
    Enqueue,
    CellAgree,
    CellRefuse,
    CellInform,
}

/// Actor state.
pub struct SchedulerState {
    address: Address,
    source: Address,
    book: SchedulerBook,
    rng: StdRng,
    router: Router<SchedulerRoute>,
    bus: Arc<MessageBus>,
    telemetry: Arc<EventBus>,
    receive_timeout: Duration,
    last_mail: Instant,
    tickers: Vec<TickerHandle>,
}

impl Actor for SchedulerActorDef {
    type Msg = SchedulerMessage;
    type State = SchedulerState;
    type Arguments = SchedulerArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            address = %args.address,
            cells = args.cells.len(),
            "SchedulerActor starting"
        );

        let cell_addresses: Vec<Address> = args.cells.iter().map(|c| c.address.clone()).collect();
        let from_cell = Template::any_sender(&cell_addresses);
        let router = Router::new()
            .route(
                Template::performative(Performative::Failure),
                SchedulerRoute::Failure,
            )
            .route(
                Template::sender(args.source.clone())
                    .and(Template::performative(Performative::Request)),
                SchedulerRoute::Enqueue,
            )
            .route(
                from_cell
                    .clone()
                    .and(Template::performative(Performative::Agree)),
                SchedulerRoute::CellAgree,
            )
            .route(
                from_cell
                    .clone()
                    .and(Template::performative(Performative::Refuse)),
                SchedulerRoute::CellRefuse,
            )
            .route(
                from_cell.and(Template::performative(Performative::Inform)),
                SchedulerRoute::CellInform,
            );

        let tickers = vec![
            Ticker::new(args.poll_interval).start(myself.clone(), || SchedulerMessage::DispatchTick),
            Ticker::new(args.snapshot_interval).start(myself, || SchedulerMessage::SnapshotTick),
        ];

        Ok(SchedulerState {
            address: args.address,
            source: args.source,
            book: SchedulerBook::new(args.dispatch, args.cells),
            rng: args
                .seed
                .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
            router,
            bus: args.bus,
            telemetry: args.telemetry,
            receive_timeout: args.receive_timeout,
            last_mail: Instant::now(),
            tickers,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            // ═══════════════════════════════════════════════════════════════
            // PROTOCOL
            // ═══════════════════════════════════════════════════════════════
            SchedulerMessage::Deliver(envelope) => {
                state.last_mail = Instant::now();
                Self::handle_envelope(&myself, state, envelope).await;
                Self::dispatch_ready(state).await;
            }

            // ═══════════════════════════════════════════════════════════════
            // TIMERS
            // ═══════════════════════════════════════════════════════════════
            SchedulerMessage::DispatchTick => {
                if state.last_mail.elapsed() >= state.receive_timeout {
                    debug!(address = %state.address, "No mail within receive timeout, re-polling");
                    state.last_mail = Instant::now();
                }
                state.book.end_cooldown();
                Self::dispatch_ready(state).await;
            }

            SchedulerMessage::SnapshotTick => {
                let stats = state.book.stats();
                state
                    .telemetry
                    .publish(FactoryEvent::roster_snapshot(
                        stats.idle_cells,
                        stats.queued,
                        stats.in_flight,
                    ))
                    .await;
            }

            // ═══════════════════════════════════════════════════════════════
            // QUERIES
            // ═══════════════════════════════════════════════════════════════
            SchedulerMessage::GetStats { reply } => {
                // Ignore send error - caller may have timed out
                let _ = reply.send(state.book.stats());
            }

            SchedulerMessage::GetOrder { order_id, reply } => {
                let _ = reply.send(state.book.order_view(order_id));
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        info!(address = %state.address, "SchedulerActor stopping");
        for ticker in &state.tickers {
            ticker.stop();
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Implementation
// ═══════════════════════════════════════════════════════════════════════════

impl SchedulerActorDef {
    async fn handle_envelope(
        myself: &ActorRef<SchedulerMessage>,
        state: &mut SchedulerState,
        envelope: Envelope,
    ) {
        let Some(route) = state.router.classify(&envelope) else {
            warn!(envelope = %envelope, "Scheduler dropping unexpected message");
            return;
        };

        match route {
            SchedulerRoute::Failure => Self::handle_failure(myself, state, &envelope).await,
            SchedulerRoute::Enqueue => Self::handle_enqueue(state, &envelope).await,
            SchedulerRoute::CellAgree => {
                debug!(cell = %envelope.sender, correlation = ?envelope.correlation, "Cell agreed");
            }
            SchedulerRoute::CellRefuse => Self::handle_refuse(state, &envelope).await,
            SchedulerRoute::CellInform => Self::handle_inform(state, &envelope).await,
        }
    }

    async fn handle_enqueue(state: &mut SchedulerState, envelope: &Envelope) {
        let order: Order = match envelope.decode() {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Scheduler dropping malformed order");
                return;
            }
        };
        let order_id = order.order_id;

        match state.book.enqueue(order) {
            Enqueued::Accepted => {
                info!(order_id, "Order queued");
                Self::reply(state, envelope, Performative::Agree, order_id).await;
                state
                    .telemetry
                    .publish(FactoryEvent::order_queued(order_id))
                    .await;
            }
            Enqueued::Rejected(reason) => {
                warn!(order_id, reason = %reason, "Order rejected");
                Self::reply(state, envelope, Performative::Refuse, order_id).await;
                state
                    .telemetry
                    .publish(FactoryEvent::order_rejected(order_id, reason))
                    .await;
            }
            Enqueued::AlreadyDone(order) => {
                Self::reply(state, envelope, Performative::Agree, order_id).await;
                Self::report_completion(state, &order).await;
            }
        }
    }

    async fn reply(
        state: &SchedulerState,
        envelope: &Envelope,
        performative: Performative,
        order_id: OrderId,
    ) {
        let reply = envelope
            .reply(performative)
            .with_correlation(order_id.to_string());
        state.bus.send_or_log(reply).await;
    }

    async fn handle_refuse(state: &mut SchedulerState, envelope: &Envelope) {
        let Some(order_id) = envelope.correlated_order() else {
            warn!(envelope = %envelope, "Refusal without order correlation");
            return;
        };
        match state.book.on_refuse(order_id, &envelope.sender) {
            Ok(()) => {
                debug!(order_id, cell = %envelope.sender, "Stage refused, order re-queued");
                state
                    .telemetry
                    .publish(FactoryEvent::stage_refused(order_id, envelope.sender.clone()))
                    .await;
            }
            Err(e) => warn!(error = %e, "Ignoring refusal"),
        }
    }

    async fn handle_inform(state: &mut SchedulerState, envelope: &Envelope) {
        let Some(order_id) = envelope.correlated_order() else {
            warn!(envelope = %envelope, "Completion without order correlation");
            return;
        };
        let report = match state.book.on_inform(order_id, &envelope.sender) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Ignoring completion");
                return;
            }
        };

        info!(order_id, cell = %envelope.sender, stage = report.stage, "Stage completed");
        state
            .telemetry
            .publish(FactoryEvent::stage_completed(
                order_id,
                envelope.sender.clone(),
                report.stage,
            ))
            .await;
        if let Some(order) = report.completed {
            Self::report_completion(state, &order).await;
        }
    }

    async fn report_completion(state: &SchedulerState, order: &Order) {
        info!(order_id = order.order_id, "Order completed");
        match Envelope::new(state.address.clone(), state.source.clone(), Performative::Inform)
            .with_correlation(order.order_id.to_string())
            .with_payload(order)
        {
            Ok(envelope) => state.bus.send_or_log(envelope).await,
            Err(e) => warn!(error = %e, "Failed to encode completion"),
        }
        state
            .telemetry
            .publish(FactoryEvent::order_completed(order.order_id))
            .await;
    }

    async fn handle_failure(
        myself: &ActorRef<SchedulerMessage>,
        state: &mut SchedulerState,
        envelope: &Envelope,
    ) {
        let reason = format!("failure from {}: {}", envelope.sender, envelope.body);
        warn!(reason = %reason, "Scheduling halted");
        state.book.halt(reason.clone());
        state
            .telemetry
            .publish(FactoryEvent::scheduler_halted(reason.clone()))
            .await;
        myself.stop(Some(ActorError::scheduling_halted(reason).to_string()));
    }

    /// Dispatch until the queue or the idle pool runs dry.
    async fn dispatch_ready(state: &mut SchedulerState) {
        while let Some(dispatch) = state.book.next_dispatch(&mut state.rng) {
            let envelope = Envelope::new(
                state.address.clone(),
                dispatch.cell.clone(),
                Performative::Request,
            )
            .with_correlation(dispatch.request.correlation())
            .with_payload(&dispatch.request);

            match envelope {
                Ok(envelope) => match state.bus.send(envelope).await {
                    Ok(()) => {
                        info!(
                            order_id = dispatch.request.order_id,
                            cell = %dispatch.cell,
                            operation = %dispatch.request.operation,
                            "Stage dispatched"
                        );
                        state
                            .telemetry
                            .publish(FactoryEvent::stage_dispatched(
                                dispatch.request.order_id,
                                dispatch.cell.clone(),
                                dispatch.request.operation,
                            ))
                            .await;
                    }
                    Err(e) => {
                        warn!(error = %e, cell = %dispatch.cell, "Cell unreachable, dropping it from the idle pool");
                        state.book.undeliverable(&dispatch);
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Failed to encode stage request");
                    state.book.undeliverable(&dispatch);
                }
            }
        }
    }
}
