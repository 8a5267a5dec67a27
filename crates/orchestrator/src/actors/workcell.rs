//! WorkCellActor - a group of machines that admits one order at a time.
//!
//! `WorkCell` holds the admission state; the actor wraps it with the
//! scheduler and transport exchanges and the processing timer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{debug, info, warn};

use industry_core::{Address, Operation, OrderId, StageRequest};
use industry_events::{EventBus, FactoryEvent};

use super::errors::ActorError;
use super::messages::{CellMessage, CellPhase, CellStatus};
use super::timer::send_after;
use crate::config::TimingConfig;
use crate::messaging::{Envelope, MessageBus, Performative, Router, Template};

/// One machine able to perform a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    pub operation: Operation,
    pub working: bool,
}

/// The order a cell has admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldOrder {
    pub request: StageRequest,
    /// Who asked; receives the completion.
    pub requester: Address,
    pub correlation: String,
    pub phase: CellPhase,
    /// Transport requests sent so far.
    pub transport_attempts: usize,
}

/// What to do right after admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    /// The goods are already here.
    WorkNow,
    NeedsTransport,
}

/// Admission state of one cell.
#[derive(Debug, Clone)]
pub struct WorkCell {
    address: Address,
    machines: BTreeMap<Operation, Vec<Machine>>,
    held: Option<HeldOrder>,
}

impl WorkCell {
    /// One working machine per listed operation; repeats add capacity.
    #[must_use]
    pub fn new(address: Address, operations: impl IntoIterator<Item = Operation>) -> Self {
        let mut machines: BTreeMap<Operation, Vec<Machine>> = BTreeMap::new();
        for operation in operations {
            machines.entry(operation).or_default().push(Machine {
                operation,
                working: true,
            });
        }
        Self {
            address,
            machines,
            held: None,
        }
    }

    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    #[must_use]
    pub const fn held(&self) -> Option<&HeldOrder> {
        self.held.as_ref()
    }

    /// Operations this cell has machines for, working or not.
    pub fn capabilities(&self) -> impl Iterator<Item = Operation> + '_ {
        self.machines.keys().copied()
    }

    /// Free, and at least one machine for the operation is working.
    #[must_use]
    pub fn can_accept(&self, request: &StageRequest) -> bool {
        self.held.is_none()
            && self
                .machines
                .get(&request.operation)
                .is_some_and(|ms| ms.iter().any(|m| m.working))
    }

    /// Take the order if admissible.
    pub fn admit(
        &mut self,
        request: StageRequest,
        requester: Address,
        correlation: String,
    ) -> Option<Admitted> {
        if !self.can_accept(&request) {
            return None;
        }
        let admitted = if request.location == self.address {
            Admitted::WorkNow
        } else {
            Admitted::NeedsTransport
        };
        let phase = match admitted {
            Admitted::WorkNow => CellPhase::Working,
            Admitted::NeedsTransport => CellPhase::AwaitingTransport,
        };
        self.held = Some(HeldOrder {
            request,
            requester,
            correlation,
            phase,
            transport_attempts: 0,
        });
        Some(admitted)
    }

    /// The held order, if it is `order_id` and still waiting for transport.
    pub fn awaiting_transport(&mut self, order_id: OrderId) -> Option<&mut HeldOrder> {
        self.held
            .as_mut()
            .filter(|h| h.request.order_id == order_id && h.phase == CellPhase::AwaitingTransport)
    }

    /// Goods arrived: start processing. Returns the operation to run.
    pub fn start_work(&mut self, order_id: OrderId) -> Option<Operation> {
        let held = self.awaiting_transport(order_id)?;
        held.phase = CellPhase::Working;
        Some(held.request.operation)
    }

    /// Processing finished: release the held order.
    pub fn finish(&mut self, order_id: OrderId) -> Option<HeldOrder> {
        let matches = self
            .held
            .as_ref()
            .is_some_and(|h| h.request.order_id == order_id && h.phase == CellPhase::Working);
        if matches { self.held.take() } else { None }
    }

    /// Set a machine's working flag. Returns whether the machine exists.
    pub fn set_machine_working(&mut self, operation: Operation, index: usize, working: bool) -> bool {
        match self
            .machines
            .get_mut(&operation)
            .and_then(|ms| ms.get_mut(index))
        {
            Some(machine) => {
                machine.working = working;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn status(&self) -> CellStatus {
        CellStatus {
            address: self.address.clone(),
            held: self.held.as_ref().map(|h| h.request.clone()),
            phase: self.held.as_ref().map(|h| h.phase),
            machines: self
                .machines
                .iter()
                .map(|(op, ms)| (*op, ms.iter().map(|m| m.working).collect()))
                .collect(),
        }
    }
}

/// The work-cell actor definition.
#[derive(Clone, Default)]
pub struct WorkCellActorDef;

/// Arguments passed to the actor on startup.
pub struct WorkCellArguments {
    pub address: Address,
    pub scheduler: Address,
    /// Transport robots in preference order.
    pub robots: Vec<Address>,
    pub operations: Vec<Operation>,
    pub timing: TimingConfig,
    pub bus: Arc<MessageBus>,
    pub telemetry: Arc<EventBus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellRoute {
    SchedulerRequest,
    TransportAgree,
    TransportRefuse,
    TransportDelivered,
}

/// Actor state.
pub struct WorkCellState {
    cell: WorkCell,
    robots: Vec<Address>,
    durations: BTreeMap<Operation, Duration>,
    transport_retry: Duration,
    router: Router<CellRoute>,
    bus: Arc<MessageBus>,
    telemetry: Arc<EventBus>,
}

impl Actor for WorkCellActorDef {
    type Msg = CellMessage;
    type State = WorkCellState;
    type Arguments = WorkCellArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            address = %args.address,
            operations = ?args.operations,
            "WorkCellActor starting"
        );
        if args.robots.is_empty() {
            return Err(ActorError::spawn_failed(format!(
                "work-cell {} has no transport robots",
                args.address
            ))
            .into());
        }

        let from_robot = Template::any_sender(&args.robots);
        let router = Router::new()
            .route(
                Template::sender(args.scheduler.clone())
                    .and(Template::performative(Performative::Request)),
                CellRoute::SchedulerRequest,
            )
            .route(
                from_robot
                    .clone()
                    .and(Template::performative(Performative::Agree)),
                CellRoute::TransportAgree,
            )
            .route(
                from_robot
                    .clone()
                    .and(Template::performative(Performative::Refuse)),
                CellRoute::TransportRefuse,
            )
            .route(
                from_robot.and(Template::performative(Performative::Inform)),
                CellRoute::TransportDelivered,
            );

        Ok(WorkCellState {
            cell: WorkCell::new(args.address, args.operations),
            robots: args.robots,
            durations: args.timing.duration_table(),
            transport_retry: args.timing.transport_retry(),
            router,
            bus: args.bus,
            telemetry: args.telemetry,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CellMessage::Deliver(envelope) => {
                Self::handle_envelope(&myself, state, envelope).await;
            }

            CellMessage::RetryTransport { order_id } => {
                Self::request_transport(state, order_id).await;
            }

            CellMessage::WorkFinished { order_id } => {
                Self::handle_work_finished(state, order_id).await;
            }

            CellMessage::SetMachineWorking {
                operation,
                index,
                working,
            } => {
                if state.cell.set_machine_working(operation, index, working) {
                    info!(cell = %state.cell.address(), operation = %operation, index, working, "Machine toggled");
                } else {
                    warn!(cell = %state.cell.address(), operation = %operation, index, "No such machine");
                }
            }

            CellMessage::GetStatus { reply } => {
                let _ = reply.send(state.cell.status());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        info!(address = %state.cell.address(), "WorkCellActor stopping");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Implementation
// ═══════════════════════════════════════════════════════════════════════════

impl WorkCellActorDef {
    async fn handle_envelope(
        myself: &ActorRef<CellMessage>,
        state: &mut WorkCellState,
        envelope: Envelope,
    ) {
        let Some(route) = state.router.classify(&envelope) else {
            warn!(cell = %state.cell.address(), envelope = %envelope, "Cell dropping unexpected message");
            return;
        };

        match route {
            CellRoute::SchedulerRequest => Self::handle_request(myself, state, &envelope).await,
            CellRoute::TransportAgree => {
                debug!(cell = %state.cell.address(), robot = %envelope.sender, "Robot agreed to fetch");
            }
            CellRoute::TransportRefuse => Self::handle_transport_refused(myself, state, &envelope),
            CellRoute::TransportDelivered => {
                Self::handle_delivered(myself, state, &envelope).await;
            }
        }
    }

    async fn handle_request(
        myself: &ActorRef<CellMessage>,
        state: &mut WorkCellState,
        envelope: &Envelope,
    ) {
        let request: StageRequest = match envelope.decode() {
            Ok(request) => request,
            Err(e) => {
                warn!(cell = %state.cell.address(), error = %e, "Refusing malformed stage request");
                state
                    .bus
                    .send_or_log(envelope.reply(Performative::Refuse))
                    .await;
                return;
            }
        };
        let order_id = request.order_id;
        let correlation = envelope
            .correlation
            .clone()
            .unwrap_or_else(|| request.correlation());

        let Some(admitted) = state
            .cell
            .admit(request, envelope.sender.clone(), correlation.clone())
        else {
            debug!(cell = %state.cell.address(), order_id, "Refusing stage");
            let reply = envelope.reply(Performative::Refuse).with_correlation(correlation);
            state.bus.send_or_log(reply).await;
            return;
        };

        debug!(cell = %state.cell.address(), order_id, admitted = ?admitted, "Stage admitted");
        let reply = envelope.reply(Performative::Agree).with_correlation(correlation);
        state.bus.send_or_log(reply).await;

        match admitted {
            Admitted::WorkNow => Self::begin_work(myself, state, order_id).await,
            Admitted::NeedsTransport => Self::request_transport(state, order_id).await,
        }
    }

    /// Ask the next robot in preference order to fetch the held goods.
    async fn request_transport(state: &mut WorkCellState, order_id: OrderId) {
        let address = state.cell.address().clone();
        let Some(held) = state.cell.awaiting_transport(order_id) else {
            debug!(order_id, "Transport no longer needed");
            return;
        };
        // Non-empty, checked in pre_start.
        let Some(robot) = held
            .transport_attempts
            .checked_rem(state.robots.len())
            .and_then(|i| state.robots.get(i))
            .cloned()
        else {
            return;
        };
        held.transport_attempts = held.transport_attempts.saturating_add(1);

        let envelope = Envelope::new(address.clone(), robot.clone(), Performative::Request)
            .with_correlation(held.request.correlation())
            .with_payload(&held.request);

        match envelope {
            Ok(envelope) => {
                debug!(cell = %address, robot = %robot, order_id, "Requesting transport");
                state.bus.send_or_log(envelope).await;
            }
            Err(e) => warn!(error = %e, "Failed to encode transport request"),
        }
    }

    fn handle_transport_refused(
        myself: &ActorRef<CellMessage>,
        state: &mut WorkCellState,
        envelope: &Envelope,
    ) {
        let Some(order_id) = envelope.correlated_order() else {
            warn!(envelope = %envelope, "Transport refusal without order correlation");
            return;
        };
        if state.cell.awaiting_transport(order_id).is_none() {
            debug!(order_id, robot = %envelope.sender, "Stale transport refusal");
            return;
        }
        debug!(
            cell = %state.cell.address(),
            robot = %envelope.sender,
            order_id,
            "Transport refused, trying the next robot"
        );
        send_after(
            myself.clone(),
            state.transport_retry,
            CellMessage::RetryTransport { order_id },
        );
    }

    async fn handle_delivered(
        myself: &ActorRef<CellMessage>,
        state: &mut WorkCellState,
        envelope: &Envelope,
    ) {
        match envelope.correlated_order() {
            Some(order_id) if state.cell.awaiting_transport(order_id).is_some() => {
                info!(cell = %state.cell.address(), robot = %envelope.sender, order_id, "Goods delivered");
                Self::begin_work(myself, state, order_id).await;
            }
            _ => warn!(envelope = %envelope, "Unexpected delivery"),
        }
    }

    async fn begin_work(myself: &ActorRef<CellMessage>, state: &mut WorkCellState, order_id: OrderId) {
        let already_working = state
            .cell
            .held()
            .is_some_and(|h| h.request.order_id == order_id && h.phase == CellPhase::Working);
        let operation = if already_working {
            state.cell.held().map(|h| h.request.operation)
        } else {
            state.cell.start_work(order_id)
        };
        let Some(operation) = operation else {
            warn!(order_id, "Nothing to work on");
            return;
        };
        let duration = state
            .durations
            .get(&operation)
            .copied()
            .unwrap_or(Duration::ZERO);

        info!(cell = %state.cell.address(), order_id, operation = %operation, ?duration, "Work started");
        state
            .telemetry
            .publish(FactoryEvent::work_started(
                order_id,
                state.cell.address().clone(),
                operation,
            ))
            .await;
        send_after(myself.clone(), duration, CellMessage::WorkFinished { order_id });
    }

    async fn handle_work_finished(state: &mut WorkCellState, order_id: OrderId) {
        let Some(held) = state.cell.finish(order_id) else {
            warn!(order_id, "Finished work for an order the cell does not hold");
            return;
        };
        info!(cell = %state.cell.address(), order_id, "Work finished");

        let envelope = Envelope::new(
            state.cell.address().clone(),
            held.requester.clone(),
            Performative::Inform,
        )
        .with_correlation(held.correlation.clone())
        .with_payload(&held.request);

        match envelope {
            Ok(envelope) => state.bus.send_or_log(envelope).await,
            Err(e) => warn!(error = %e, "Failed to encode completion"),
        }
    }
}
