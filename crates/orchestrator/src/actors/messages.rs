//! Messages for the factory actors.
//!
//! Design principles:
//! - Protocol traffic arrives as `Deliver(Envelope)` from the message bus
//! - Timer ticks are posted by the actor's own ticker tasks
//! - Queries return responses (use `call!`)

use ractor::RpcReplyPort;
use serde::{Deserialize, Serialize};

use industry_core::{Address, Operation, Order, OrderId, Position, StageRequest};

use super::robot::{HelperState, LeaderState};
use crate::messaging::Envelope;

/// Scheduler bookkeeping snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub in_flight: usize,
    pub idle_cells: Vec<Address>,
    /// Cells that refused and wait for the next poll tick.
    pub cooling_cells: Vec<Address>,
    pub completed: u64,
    pub halted: Option<String>,
}

/// Where an order currently stands, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order: Order,
    /// Where the goods sit.
    pub location: Address,
    /// Cell working on the current stage, if dispatched.
    pub cell: Option<Address>,
    pub queued: bool,
}

/// Messages for the `SchedulerActor`.
#[derive(Debug)]
pub enum SchedulerMessage {
    // ═══════════════════════════════════════════════════════════════════════
    // PROTOCOL
    // ═══════════════════════════════════════════════════════════════════════
    Deliver(Envelope),

    // ═══════════════════════════════════════════════════════════════════════
    // TIMERS
    // ═══════════════════════════════════════════════════════════════════════
    /// Periodic dispatch poll.
    DispatchTick,
    /// Periodic roster snapshot telemetry.
    SnapshotTick,

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES (request-response via call!)
    // ═══════════════════════════════════════════════════════════════════════
    GetStats {
        reply: RpcReplyPort<SchedulerStats>,
    },
    GetOrder {
        order_id: OrderId,
        reply: RpcReplyPort<Option<OrderView>>,
    },
}

impl From<Envelope> for SchedulerMessage {
    fn from(envelope: Envelope) -> Self {
        Self::Deliver(envelope)
    }
}

/// What a work-cell is doing with its held order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellPhase {
    /// Waiting for a robot to bring the goods.
    AwaitingTransport,
    Working,
}

/// Work-cell status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStatus {
    pub address: Address,
    pub held: Option<StageRequest>,
    pub phase: Option<CellPhase>,
    /// Working flags per machine, grouped by operation.
    pub machines: Vec<(Operation, Vec<bool>)>,
}

/// Messages for the `WorkCellActor`.
#[derive(Debug)]
pub enum CellMessage {
    Deliver(Envelope),

    /// Ask the current transport robot again after a refusal.
    RetryTransport { order_id: OrderId },
    /// The operation's processing time elapsed.
    WorkFinished { order_id: OrderId },

    /// Toggle one machine (breakdown simulation).
    SetMachineWorking {
        operation: Operation,
        index: usize,
        working: bool,
    },

    GetStatus {
        reply: RpcReplyPort<CellStatus>,
    },
}

impl From<Envelope> for CellMessage {
    fn from(envelope: Envelope) -> Self {
        Self::Deliver(envelope)
    }
}

/// Coarse robot role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Idle,
    Solo,
    Leader,
    Helper,
}

/// Transport robot status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub address: Address,
    pub position: Position,
    pub role: RoleKind,
    pub leader_state: Option<LeaderState>,
    pub helper_state: Option<HelperState>,
    /// The order this robot was asked to fetch, if any.
    pub own_order: Option<OrderId>,
    /// The order being carried for a leader, if any.
    pub borrowed_order: Option<OrderId>,
    /// Leaders this robot agreed to but has not been confirmed by.
    pub pending_helps: Vec<Address>,
    /// Leaders that confirmed this robot as a helper.
    pub confirmed_helps: Vec<Address>,
    /// Helpers confirmed while leading.
    pub helpers: Vec<Address>,
}

/// Messages for the `TransportRobotActor`.
#[derive(Debug)]
pub enum RobotMessage {
    Deliver(Envelope),

    /// Decision loop period.
    DecisionTick,
    /// Movement integration tick for the motion with this sequence number.
    MoveTick { seq: u64 },
    /// Recruitment broadcast round for the leadership with this token.
    RecruitRound { token: String },

    GetStatus {
        reply: RpcReplyPort<RobotStatus>,
    },
}

impl From<Envelope> for RobotMessage {
    fn from(envelope: Envelope) -> Self {
        Self::Deliver(envelope)
    }
}

/// Order source counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub submitted: u64,
    pub accepted: Vec<OrderId>,
    pub rejected: Vec<OrderId>,
    pub completed: Vec<OrderId>,
}

/// Messages for the `OrderSourceActor`.
#[derive(Debug)]
pub enum SourceMessage {
    Deliver(Envelope),

    /// Emit the next generated order.
    EmitTick,
    /// Submit a specific order.
    Submit(Order),

    GetStats {
        reply: RpcReplyPort<SourceStats>,
    },
}

impl From<Envelope> for SourceMessage {
    fn from(envelope: Envelope) -> Self {
        Self::Deliver(envelope)
    }
}
