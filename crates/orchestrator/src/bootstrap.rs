//! Wiring a whole factory from configuration.
//!
//! `Factory::launch` lays out the floor, spawns every agent, registers its
//! mailbox on a fresh `MessageBus` and hands back the actor references.

use std::sync::Arc;
use std::time::Duration;

use ractor::ActorRef;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use industry_events::EventBus;

use crate::actors::scheduler::GoMInfo;
use crate::actors::{
    ActorError, CellMessage, RobotArguments, RobotMessage, SchedulerArguments, SchedulerMessage,
    SchedulerStats, SourceArguments, SourceMessage, SourceStats, WorkCellArguments, query,
    spawn_robot, spawn_scheduler, spawn_source, spawn_work_cell,
};
use crate::config::FactoryConfig;
use crate::layout::FactoryLayout;
use crate::messaging::{Envelope, Mailbox, MessageBus};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Launch switches that are not part of the factory configuration.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Emit generated orders on the configured period.
    pub auto_emit: bool,
    /// Spawn the order source at all. Off leaves `factory` unregistered so
    /// a test can register its own mailbox there.
    pub with_source: bool,
    /// Prefix for actor registry names; `None` spawns anonymous actors.
    pub name_prefix: Option<String>,
    /// Copy of every envelope routed by the bus.
    pub tap: Option<mpsc::UnboundedSender<Envelope>>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            auto_emit: true,
            with_source: true,
            name_prefix: None,
            tap: None,
        }
    }
}

impl LaunchOptions {
    #[must_use]
    pub const fn without_auto_emit(mut self) -> Self {
        self.auto_emit = false;
        self
    }

    #[must_use]
    pub const fn without_source(mut self) -> Self {
        self.with_source = false;
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_tap(mut self, tap: mpsc::UnboundedSender<Envelope>) -> Self {
        self.tap = Some(tap);
        self
    }

    fn name(&self, address: &str) -> Option<String> {
        self.name_prefix
            .as_ref()
            .map(|prefix| format!("{prefix}{address}"))
    }
}

/// How a timed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Elapsed,
    SchedulerStopped,
}

/// A running factory.
pub struct Factory {
    pub layout: FactoryLayout,
    pub bus: Arc<MessageBus>,
    pub telemetry: Arc<EventBus>,
    pub scheduler: ActorRef<SchedulerMessage>,
    pub cells: Vec<ActorRef<CellMessage>>,
    pub robots: Vec<ActorRef<RobotMessage>>,
    pub source: Option<ActorRef<SourceMessage>>,
    scheduler_handle: Option<JoinHandle<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Factory {
    /// Spawn every agent described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout cannot be built or an actor fails to
    /// spawn.
    pub async fn launch(
        config: &FactoryConfig,
        telemetry: Arc<EventBus>,
        options: LaunchOptions,
    ) -> Result<Self, ActorError> {
        let layout = FactoryLayout::from_config(config)
            .map_err(|e| ActorError::spawn_failed(format!("invalid layout: {e}")))?;
        let bus = Arc::new(
            options
                .tap
                .clone()
                .map_or_else(MessageBus::new, MessageBus::with_tap),
        );
        let seed = config.layout.seed;
        let derive_seed = |offset: u64| seed.map(|s| s.wrapping_add(offset));
        let mut handles = Vec::new();

        info!(
            cells = layout.cells.len(),
            robots = layout.robots.len(),
            "Launching factory"
        );

        let roster: Vec<GoMInfo> = layout
            .cells
            .iter()
            .map(|c| GoMInfo::new(c.address.clone(), c.operations.iter().copied()))
            .collect();
        let scheduler_args = SchedulerArguments::new(
            layout.scheduler.clone(),
            layout.source.clone(),
            roster,
            Arc::clone(&bus),
            Arc::clone(&telemetry),
        )
        .with_dispatch(config.dispatch.clone())
        .with_timing(&config.timing)
        .with_seed(seed);
        let (scheduler, scheduler_handle) =
            spawn_scheduler(options.name(layout.scheduler.as_str()), scheduler_args).await?;
        bus.register(layout.scheduler.clone(), Arc::new(scheduler.clone()) as Arc<dyn Mailbox>)
            .await;

        let mut cells = Vec::with_capacity(layout.cells.len());
        for (index, site) in layout.cells.iter().enumerate() {
            let args = WorkCellArguments {
                address: site.address.clone(),
                scheduler: layout.scheduler.clone(),
                robots: layout.robot_preference(index),
                operations: site.operations.clone(),
                timing: config.timing.clone(),
                bus: Arc::clone(&bus),
                telemetry: Arc::clone(&telemetry),
            };
            let (cell, handle) = spawn_work_cell(options.name(site.address.as_str()), args).await?;
            bus.register(site.address.clone(), Arc::new(cell.clone()) as Arc<dyn Mailbox>)
                .await;
            cells.push(cell);
            handles.push(handle);
        }

        let sites = layout.sites();
        let cell_addresses = layout.cell_addresses();
        let mut robots = Vec::with_capacity(layout.robots.len());
        for (index, site) in layout.robots.iter().enumerate() {
            let args = RobotArguments {
                address: site.address.clone(),
                peers: layout.peers_of(&site.address),
                cells: cell_addresses.clone(),
                sites: sites.clone(),
                start: site.start,
                robot: config.robots.clone(),
                timing: config.timing.clone(),
                seed: derive_seed(1000 + index as u64),
                bus: Arc::clone(&bus),
                telemetry: Arc::clone(&telemetry),
            };
            let (robot, handle) = spawn_robot(options.name(site.address.as_str()), args).await?;
            bus.register(site.address.clone(), Arc::new(robot.clone()) as Arc<dyn Mailbox>)
                .await;
            robots.push(robot);
            handles.push(handle);
        }

        let source = if options.with_source {
            let pool = if config.orders.only_serviceable {
                layout.serviceable()
            } else {
                Vec::new()
            };
            let args = SourceArguments {
                address: layout.source.clone(),
                scheduler: layout.scheduler.clone(),
                orders: config.orders.clone(),
                pool,
                auto_emit: options.auto_emit,
                seed: derive_seed(1),
                bus: Arc::clone(&bus),
            };
            let (source, handle) = spawn_source(options.name(layout.source.as_str()), args).await?;
            bus.register(layout.source.clone(), Arc::new(source.clone()) as Arc<dyn Mailbox>)
                .await;
            handles.push(handle);
            Some(source)
        } else {
            None
        };

        Ok(Self {
            layout,
            bus,
            telemetry,
            scheduler,
            cells,
            robots,
            source,
            scheduler_handle: Some(scheduler_handle),
            handles,
        })
    }

    /// Run until `duration` elapses or the scheduler stops.
    pub async fn run_for(&mut self, duration: Duration) -> RunOutcome {
        let Some(handle) = self.scheduler_handle.as_mut() else {
            return RunOutcome::SchedulerStopped;
        };
        tokio::select! {
            () = tokio::time::sleep(duration) => RunOutcome::Elapsed,
            _ = handle => {
                self.scheduler_handle = None;
                RunOutcome::SchedulerStopped
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if the scheduler does not answer.
    pub async fn scheduler_stats(&self) -> Result<SchedulerStats, ActorError> {
        query(
            &self.scheduler,
            |reply| SchedulerMessage::GetStats { reply },
            QUERY_TIMEOUT,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if there is no source or it does not answer.
    pub async fn source_stats(&self) -> Result<SourceStats, ActorError> {
        let Some(source) = &self.source else {
            return Err(ActorError::actor_unavailable());
        };
        query(source, |reply| SourceMessage::GetStats { reply }, QUERY_TIMEOUT).await
    }

    /// Stop every actor and wait for them to finish.
    pub async fn shutdown(mut self) {
        info!("Shutting down factory");
        if let Some(source) = &self.source {
            source.stop(None);
        }
        for robot in &self.robots {
            robot.stop(None);
        }
        for cell in &self.cells {
            cell.stop(None);
        }
        self.scheduler.stop(None);

        if let Some(handle) = self.scheduler_handle.take() {
            self.handles.push(handle);
        }
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Actor task ended abnormally");
            }
        }
    }
}
