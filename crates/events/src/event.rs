//! Factory telemetry events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use industry_core::{Address, Operation, OrderId, Position};

/// Telemetry published by factory agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FactoryEvent {
    /// A robot moved one tick.
    RobotMoved {
        robot: Address,
        position: Position,
        timestamp: DateTime<Utc>,
    },
    /// Periodic scheduler roster snapshot.
    RosterSnapshot {
        idle_cells: Vec<Address>,
        queued_orders: usize,
        in_flight_orders: usize,
        timestamp: DateTime<Utc>,
    },
    /// The scheduler accepted an order into its queue.
    OrderQueued {
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },
    /// The scheduler refused an order it could never complete.
    OrderRejected {
        order_id: OrderId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A stage was sent to a work-cell.
    StageDispatched {
        order_id: OrderId,
        cell: Address,
        operation: Operation,
        timestamp: DateTime<Utc>,
    },
    /// A work-cell refused a stage.
    StageRefused {
        order_id: OrderId,
        cell: Address,
        timestamp: DateTime<Utc>,
    },
    /// A work-cell started processing.
    WorkStarted {
        order_id: OrderId,
        cell: Address,
        operation: Operation,
        timestamp: DateTime<Utc>,
    },
    /// A stage finished at a work-cell.
    StageCompleted {
        order_id: OrderId,
        cell: Address,
        stage: usize,
        timestamp: DateTime<Utc>,
    },
    /// Every stage of an order finished.
    OrderCompleted {
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },
    /// A leader confirmed all the helpers it needs.
    HelpersRecruited {
        leader: Address,
        order_id: OrderId,
        helpers: Vec<Address>,
        timestamp: DateTime<Utc>,
    },
    /// A leader gave up recruiting and released its helpers.
    RecruitmentAbandoned {
        leader: Address,
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },
    /// Goods were delivered to a work-cell.
    Delivered {
        robot: Address,
        cell: Address,
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },
    /// The scheduler stopped scheduling.
    SchedulerHalted {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl FactoryEvent {
    /// Create a robot moved event.
    #[must_use]
    pub fn robot_moved(robot: Address, position: Position) -> Self {
        Self::RobotMoved {
            robot,
            position,
            timestamp: Utc::now(),
        }
    }

    /// Create a roster snapshot event.
    #[must_use]
    pub fn roster_snapshot(
        idle_cells: Vec<Address>,
        queued_orders: usize,
        in_flight_orders: usize,
    ) -> Self {
        Self::RosterSnapshot {
            idle_cells,
            queued_orders,
            in_flight_orders,
            timestamp: Utc::now(),
        }
    }

    /// Create an order queued event.
    #[must_use]
    pub fn order_queued(order_id: OrderId) -> Self {
        Self::OrderQueued {
            order_id,
            timestamp: Utc::now(),
        }
    }

    /// Create an order rejected event.
    #[must_use]
    pub fn order_rejected(order_id: OrderId, reason: impl Into<String>) -> Self {
        Self::OrderRejected {
            order_id,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a stage dispatched event.
    #[must_use]
    pub fn stage_dispatched(order_id: OrderId, cell: Address, operation: Operation) -> Self {
        Self::StageDispatched {
            order_id,
            cell,
            operation,
            timestamp: Utc::now(),
        }
    }

    /// Create a stage refused event.
    #[must_use]
    pub fn stage_refused(order_id: OrderId, cell: Address) -> Self {
        Self::StageRefused {
            order_id,
            cell,
            timestamp: Utc::now(),
        }
    }

    /// Create a work started event.
    #[must_use]
    pub fn work_started(order_id: OrderId, cell: Address, operation: Operation) -> Self {
        Self::WorkStarted {
            order_id,
            cell,
            operation,
            timestamp: Utc::now(),
        }
    }

    /// Create a stage completed event.
    #[must_use]
    pub fn stage_completed(order_id: OrderId, cell: Address, stage: usize) -> Self {
        Self::StageCompleted {
            order_id,
            cell,
            stage,
            timestamp: Utc::now(),
        }
    }

    /// Create an order completed event.
    #[must_use]
    pub fn order_completed(order_id: OrderId) -> Self {
        Self::OrderCompleted {
            order_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a helpers recruited event.
    #[must_use]
    pub fn helpers_recruited(leader: Address, order_id: OrderId, helpers: Vec<Address>) -> Self {
        Self::HelpersRecruited {
            leader,
            order_id,
            helpers,
            timestamp: Utc::now(),
        }
    }

    /// Create a recruitment abandoned event.
    #[must_use]
    pub fn recruitment_abandoned(leader: Address, order_id: OrderId) -> Self {
        Self::RecruitmentAbandoned {
            leader,
            order_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a delivered event.
    #[must_use]
    pub fn delivered(robot: Address, cell: Address, order_id: OrderId) -> Self {
        Self::Delivered {
            robot,
            cell,
            order_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a scheduler halted event.
    #[must_use]
    pub fn scheduler_halted(reason: impl Into<String>) -> Self {
        Self::SchedulerHalted {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Get the event type as a string.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RobotMoved { .. } => "robot_moved",
            Self::RosterSnapshot { .. } => "roster_snapshot",
            Self::OrderQueued { .. } => "order_queued",
            Self::OrderRejected { .. } => "order_rejected",
            Self::StageDispatched { .. } => "stage_dispatched",
            Self::StageRefused { .. } => "stage_refused",
            Self::WorkStarted { .. } => "work_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::OrderCompleted { .. } => "order_completed",
            Self::HelpersRecruited { .. } => "helpers_recruited",
            Self::RecruitmentAbandoned { .. } => "recruitment_abandoned",
            Self::Delivered { .. } => "delivered",
            Self::SchedulerHalted { .. } => "scheduler_halted",
        }
    }

    /// The order this event concerns, if any.
    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::OrderQueued { order_id, .. }
            | Self::OrderRejected { order_id, .. }
            | Self::StageDispatched { order_id, .. }
            | Self::StageRefused { order_id, .. }
            | Self::WorkStarted { order_id, .. }
            | Self::StageCompleted { order_id, .. }
            | Self::OrderCompleted { order_id, .. }
            | Self::HelpersRecruited { order_id, .. }
            | Self::RecruitmentAbandoned { order_id, .. }
            | Self::Delivered { order_id, .. } => Some(*order_id),
            Self::RobotMoved { .. } | Self::RosterSnapshot { .. } | Self::SchedulerHalted { .. } => {
                None
            }
        }
    }

    /// The agent this event is about, if any.
    #[must_use]
    pub const fn agent(&self) -> Option<&Address> {
        match self {
            Self::RobotMoved { robot, .. } | Self::Delivered { robot, .. } => Some(robot),
            Self::StageDispatched { cell, .. }
            | Self::StageRefused { cell, .. }
            | Self::WorkStarted { cell, .. }
            | Self::StageCompleted { cell, .. } => Some(cell),
            Self::HelpersRecruited { leader, .. } | Self::RecruitmentAbandoned { leader, .. } => {
                Some(leader)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_completed_event() {
        let event = FactoryEvent::order_completed(3);
        assert_eq!(event.event_type(), "order_completed");
        assert_eq!(event.order_id(), Some(3));
        assert!(event.agent().is_none());
    }

    #[test]
    fn test_robot_moved_event_has_agent() {
        let event = FactoryEvent::robot_moved(Address::new("tr-1"), Position::new(1.0, 2.0));
        assert_eq!(event.agent(), Some(&Address::new("tr-1")));
        assert_eq!(event.order_id(), None);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let event = FactoryEvent::stage_refused(9, Address::new("gom-2"));
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["type"], "stage_refused");
        assert_eq!(json["cell"], "gom-2");
    }
}
