//! Structured-log consumer for telemetry.

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bus::EventSubscription;
use crate::error::Error;
use crate::event::FactoryEvent;

/// Forward every event of `subscription` to `tracing` until the bus closes.
pub fn spawn_log_sink(mut subscription: EventSubscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Ok(event) => log_event(&event),
                Err(Error::Lagged { skipped }) => {
                    warn!(skipped, "Telemetry sink lagging");
                }
                Err(_) => {
                    debug!("Telemetry subscription closed");
                    break;
                }
            }
        }
    })
}

fn log_event(event: &FactoryEvent) {
    match event {
        FactoryEvent::RobotMoved { robot, position, .. } => {
            trace!(robot = %robot, position = %position, "robot moved");
        }
        FactoryEvent::RosterSnapshot {
            idle_cells,
            queued_orders,
            in_flight_orders,
            ..
        } => {
            debug!(
                idle_cells = idle_cells.len(),
                queued_orders, in_flight_orders, "roster snapshot"
            );
        }
        FactoryEvent::OrderCompleted { order_id, .. } => {
            info!(order_id, "order completed");
        }
        FactoryEvent::SchedulerHalted { reason, .. } => {
            warn!(reason = %reason, "scheduler halted");
        }
        FactoryEvent::RecruitmentAbandoned {
            leader, order_id, ..
        } => {
            warn!(leader = %leader, order_id, "recruitment abandoned");
        }
        other => {
            debug!(event_type = other.event_type(), order_id = ?other.order_id(), "factory event");
        }
    }
}
