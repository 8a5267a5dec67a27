//! Spawn and query helpers for the factory actors.
//!
//! Each spawn helper starts one actor, optionally under a registry name, and
//! maps ractor's spawn error into `ActorError::SpawnFailed`.

use std::time::Duration;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, Message, RpcReplyPort};
use tokio::task::JoinHandle;

use super::errors::ActorError;
use super::messages::{CellMessage, RobotMessage, SchedulerMessage, SourceMessage};
use super::robot::{RobotArguments, TransportRobotActorDef};
use super::scheduler::{SchedulerActorDef, SchedulerArguments};
use super::source::{OrderSourceActorDef, SourceArguments};
use super::workcell::{WorkCellActorDef, WorkCellArguments};

/// A running actor and the task that completes when it stops.
pub type Spawned<M> = (ActorRef<M>, JoinHandle<()>);

async fn spawn_named<A: Actor>(
    kind: &str,
    name: Option<String>,
    actor: A,
    args: A::Arguments,
) -> Result<Spawned<A::Msg>, ActorError> {
    let label = name.clone().unwrap_or_else(|| "<anonymous>".to_string());
    Actor::spawn(name, actor, args)
        .await
        .map_err(|e| ActorError::spawn_failed(format!("Failed to spawn {kind} '{label}': {e}")))
}

/// Spawn the scheduler.
pub async fn spawn_scheduler(
    name: Option<String>,
    args: SchedulerArguments,
) -> Result<Spawned<SchedulerMessage>, ActorError> {
    spawn_named("scheduler", name, SchedulerActorDef, args).await
}

/// Spawn a work-cell.
pub async fn spawn_work_cell(
    name: Option<String>,
    args: WorkCellArguments,
) -> Result<Spawned<CellMessage>, ActorError> {
    spawn_named("work-cell", name, WorkCellActorDef, args).await
}

/// Spawn a transport robot.
pub async fn spawn_robot(
    name: Option<String>,
    args: RobotArguments,
) -> Result<Spawned<RobotMessage>, ActorError> {
    spawn_named("robot", name, TransportRobotActorDef, args).await
}

/// Spawn the order source.
pub async fn spawn_source(
    name: Option<String>,
    args: SourceArguments,
) -> Result<Spawned<SourceMessage>, ActorError> {
    spawn_named("order source", name, OrderSourceActorDef, args).await
}

/// Request-response round trip with a timeout.
pub async fn query<M, T, F>(actor: &ActorRef<M>, make: F, timeout: Duration) -> Result<T, ActorError>
where
    M: Message,
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> M,
{
    match actor.call(make, Some(timeout)).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(ActorError::rpc_timeout(timeout)),
        Ok(CallResult::SenderError) => Err(ActorError::actor_unavailable()),
        Err(e) => Err(ActorError::delivery_failed(
            actor.get_id().to_string(),
            e.to_string(),
        )),
    }
}
