//! Actors of the factory floor.
//!
//! Every agent is a ractor actor that owns its state exclusively and talks
//! to the others only through envelopes on the `MessageBus`:
//!
//! - `SchedulerActorDef`: order queue, idle cell pool, dispatch
//! - `WorkCellActorDef`: admission control and processing
//! - `TransportRobotActorDef`: solo and cooperative transport
//! - `OrderSourceActorDef`: order stream
//!
//! # Example
//!
//! ```ignore
//! use industry_orchestrator::actors::{query, spawn_scheduler, SchedulerArguments, SchedulerMessage};
//!
//! let (scheduler, _handle) = spawn_scheduler(Some("manager".into()), args).await?;
//! let stats = query(&scheduler, |reply| SchedulerMessage::GetStats { reply }, timeout).await?;
//! println!("queued: {}", stats.queued);
//! scheduler.stop(None);
//! ```

pub mod errors;
pub mod messages;
pub mod robot;
pub mod scheduler;
pub mod source;
pub mod spawn;
pub mod timer;
pub mod workcell;

// Re-export main types for convenience
pub use errors::ActorError;
pub use messages::{
    CellMessage, CellPhase, CellStatus, OrderView, RobotMessage, RobotStatus, RoleKind,
    SchedulerMessage, SchedulerStats, SourceMessage, SourceStats,
};
pub use robot::{RobotArguments, TransportRobotActorDef};
pub use scheduler::{GoMInfo, SchedulerActorDef, SchedulerArguments, SchedulerBook};
pub use source::{OrderFactory, OrderSourceActorDef, SourceArguments};
pub use spawn::{Spawned, query, spawn_robot, spawn_scheduler, spawn_source, spawn_work_cell};
pub use timer::{Ticker, TickerHandle, calculate_backoff, send_after};
pub use workcell::{WorkCell, WorkCellActorDef, WorkCellArguments};
